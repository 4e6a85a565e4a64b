//! Client-side state machines for the OTP entry screen.
//!
//! Pure transition logic: callers feed in clock readings and input events
//! and render from the returned state. Keeping the transitions free of
//! timers and DOM concerns makes them unit-testable and reusable across
//! frontends.

pub mod code_input;
pub mod countdown;

pub use code_input::{CodeInput, InputEvent, CELLS};
pub use countdown::{Countdown, CountdownState};
