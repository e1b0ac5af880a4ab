pub mod parse_poller;
pub mod status_board;

pub use parse_poller::{
    ParsePoller, ParseUpdate, PollErrorFn, SubscribeOptions, Subscription, UpdateFn,
};
pub use status_board::StatusBoard;
