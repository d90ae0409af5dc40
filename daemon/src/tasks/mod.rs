//! The polling tasks driven by the [`TaskHandler`](crate::task_handler::TaskHandler).
mod poll_fg_win;
mod poll_hotkeys;

pub use poll_fg_win::PollFgWin;
pub use poll_hotkeys::PollHotkeys;
