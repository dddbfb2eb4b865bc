pub mod popup;
pub mod sms;
pub mod sound;
pub mod state;

pub use state::{AlertAction, SessionAlertState};
