use serde::{Deserialize, Deserializer, Serialize};

use super::membership::RatingState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    #[serde(default)]
    pub username: Option<String>,
}

impl Account {
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| format!("account {}", self.id))
    }
}

/// Per-movie account flags as returned by `movie/{id}/account_states`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountStates {
    pub id: u64,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub watchlist: bool,
    #[serde(default = "unrated", deserialize_with = "deserialize_rated")]
    pub rated: RatingState,
}

fn unrated() -> RatingState {
    RatingState::Unrated
}

/// The API sends `"rated": false` or `"rated": {"value": 7.5}`.
fn deserialize_rated<'de, D>(deserializer: D) -> Result<RatingState, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Rated {
        Flag(bool),
        Value { value: f64 },
    }

    Ok(match Option::<Rated>::deserialize(deserializer)? {
        Some(Rated::Value { value }) => RatingState::Rated(value),
        Some(Rated::Flag(_)) | None => RatingState::Unrated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_states_unrated() {
        let states: AccountStates = serde_json::from_str(
            r#"{"id": 550, "favorite": true, "watchlist": false, "rated": false}"#,
        )
        .unwrap();
        assert!(states.favorite);
        assert!(!states.watchlist);
        assert_eq!(states.rated, RatingState::Unrated);
    }

    #[test]
    fn test_account_states_rated() {
        let states: AccountStates =
            serde_json::from_str(r#"{"id": 550, "rated": {"value": 8.5}}"#).unwrap();
        assert_eq!(states.rated, RatingState::Rated(8.5));
        assert!(!states.favorite);
    }

    #[test]
    fn test_account_display_name_fallback() {
        let account = Account {
            id: 42,
            username: None,
        };
        assert_eq!(account.display_name(), "account 42");
    }
}
