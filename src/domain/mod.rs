pub mod account;
pub mod credentials;
pub mod membership;
pub mod movie;

pub use account::{Account, AccountStates};
pub use credentials::Credentials;
pub use membership::{ListKind, MembershipState, PendingOp, RatingState, TriState};
pub use movie::{Genre, GenreList, Movie, Page, Person};
