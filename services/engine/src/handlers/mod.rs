pub mod admin;
pub mod bets;
pub mod claims;
pub mod external;
pub mod health;
pub mod rounds;
