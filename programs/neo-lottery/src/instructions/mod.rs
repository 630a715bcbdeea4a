pub mod admin;
pub mod draw_round;
pub mod place_bet;
pub mod request_prize;
pub mod shared;

pub use admin::*;
pub use draw_round::*;
pub use place_bet::*;
pub use request_prize::*;
