use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriState {
    #[default]
    Unknown,
    True,
    False,
}

impl TriState {
    pub fn from_bool(value: bool) -> Self {
        if value {
            TriState::True
        } else {
            TriState::False
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            TriState::Unknown => None,
            TriState::True => Some(true),
            TriState::False => Some(false),
        }
    }
}

/// The account lists an item can be a member of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListKind {
    Favorite,
    Watchlist,
}

impl ListKind {
    pub const ALL: [ListKind; 2] = [ListKind::Favorite, ListKind::Watchlist];

    /// Path segment and JSON body field used by the account endpoints.
    pub fn as_str(self) -> &'static str {
        match self {
            ListKind::Favorite => "favorite",
            ListKind::Watchlist => "watchlist",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The signed-in user's rating of an item.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum RatingState {
    #[default]
    Unknown,
    Unrated,
    Rated(f64),
}

impl RatingState {
    pub fn value(self) -> Option<f64> {
        match self {
            RatingState::Rated(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PendingOp {
    #[default]
    None,
    Toggle,
}

/// Local view of one item's account-list membership.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipState {
    pub favorited: TriState,
    pub watchlisted: TriState,
    pub favorite_pending: PendingOp,
    pub watchlist_pending: PendingOp,
    pub rating: RatingState,
}

impl MembershipState {
    pub fn flag(&self, list: ListKind) -> TriState {
        match list {
            ListKind::Favorite => self.favorited,
            ListKind::Watchlist => self.watchlisted,
        }
    }

    pub fn set_flag(&mut self, list: ListKind, value: TriState) {
        match list {
            ListKind::Favorite => self.favorited = value,
            ListKind::Watchlist => self.watchlisted = value,
        }
    }

    pub fn pending(&self, list: ListKind) -> PendingOp {
        match list {
            ListKind::Favorite => self.favorite_pending,
            ListKind::Watchlist => self.watchlist_pending,
        }
    }

    pub fn set_pending(&mut self, list: ListKind, op: PendingOp) {
        match list {
            ListKind::Favorite => self.favorite_pending = op,
            ListKind::Watchlist => self.watchlist_pending = op,
        }
    }

    pub fn is_pending(&self, list: ListKind) -> bool {
        self.pending(list) != PendingOp::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tristate_conversions() {
        assert_eq!(TriState::from_bool(true), TriState::True);
        assert_eq!(TriState::from_bool(false), TriState::False);
        assert_eq!(TriState::Unknown.as_bool(), None);
        assert_eq!(TriState::True.as_bool(), Some(true));
    }

    #[test]
    fn test_flags_are_independent_per_list() {
        let mut state = MembershipState::default();
        state.set_flag(ListKind::Favorite, TriState::True);
        state.set_pending(ListKind::Watchlist, PendingOp::Toggle);

        assert_eq!(state.flag(ListKind::Favorite), TriState::True);
        assert_eq!(state.flag(ListKind::Watchlist), TriState::Unknown);
        assert!(!state.is_pending(ListKind::Favorite));
        assert!(state.is_pending(ListKind::Watchlist));
    }

    #[test]
    fn test_list_kind_path_segment() {
        assert_eq!(ListKind::Favorite.to_string(), "favorite");
        assert_eq!(ListKind::Watchlist.as_str(), "watchlist");
    }
}
