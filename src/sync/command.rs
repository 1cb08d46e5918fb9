use serde_json::json;

use crate::domain::{ListKind, MembershipState, PendingOp, TriState};
use crate::transport::ApiRequest;

/// One optimistic flip of an item's membership in an account list.
///
/// `apply` shows the target state right away, then exactly one of
/// `confirm` or `revert` settles it. `prior` is the local flag before the
/// toggle, possibly `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToggleCommand {
    pub item_id: u64,
    pub list: ListKind,
    pub prior: TriState,
    pub target: bool,
}

impl ToggleCommand {
    pub fn new(item_id: u64, list: ListKind, prior: TriState, currently_member: bool) -> Self {
        Self {
            item_id,
            list,
            prior,
            target: !currently_member,
        }
    }

    pub fn apply(&self, state: &mut MembershipState) {
        state.set_flag(self.list, TriState::from_bool(self.target));
        state.set_pending(self.list, PendingOp::Toggle);
    }

    pub fn confirm(&self, state: &mut MembershipState) {
        state.set_pending(self.list, PendingOp::None);
    }

    pub fn revert(&self, state: &mut MembershipState) {
        state.set_flag(self.list, self.prior);
        state.set_pending(self.list, PendingOp::None);
    }

    /// `POST account/{account_id}/{list}` carrying the target membership.
    pub fn request(&self, account_id: &str, session_id: &str) -> ApiRequest {
        let mut body = json!({
            "media_type": "movie",
            "media_id": self.item_id,
        });
        body[self.list.as_str()] = json!(self.target);

        ApiRequest::post(format!("account/{}/{}", account_id, self.list))
            .query("session_id", session_id)
            .json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_then_revert_restores_prior() {
        let mut state = MembershipState::default();
        state.set_flag(ListKind::Favorite, TriState::False);
        let before = state.clone();

        let cmd = ToggleCommand::new(550, ListKind::Favorite, state.favorited, false);
        cmd.apply(&mut state);
        assert_eq!(state.favorited, TriState::True);
        assert!(state.is_pending(ListKind::Favorite));

        cmd.revert(&mut state);
        assert_eq!(state, before);
    }

    #[test]
    fn test_revert_restores_unknown() {
        let mut state = MembershipState::default();
        let cmd = ToggleCommand::new(550, ListKind::Favorite, state.favorited, true);
        cmd.apply(&mut state);
        assert_eq!(state.favorited, TriState::False);

        cmd.revert(&mut state);
        assert_eq!(state, MembershipState::default());
    }

    #[test]
    fn test_confirm_keeps_target() {
        let mut state = MembershipState::default();
        let cmd = ToggleCommand::new(550, ListKind::Watchlist, TriState::True, true);
        cmd.apply(&mut state);
        cmd.confirm(&mut state);

        assert_eq!(state.watchlisted, TriState::False);
        assert!(!state.is_pending(ListKind::Watchlist));
    }

    #[test]
    fn test_request_body_names_the_list() {
        let request = ToggleCommand::new(550, ListKind::Watchlist, TriState::Unknown, false)
            .request("42", "sess-1");
        assert_eq!(request.path, "account/42/watchlist");
        assert_eq!(request.query_value("session_id"), Some("sess-1"));
        assert_eq!(
            request.body,
            Some(json!({"media_type": "movie", "media_id": 550, "watchlist": true}))
        );
    }
}
