/// Line-oriented command shell for a [`crate::Store`].
///
/// Each input line is one command (`LPUSH queue job-1`); each output line is
/// `OK`, `OK <json>` or `ERR <message>`. The `bankersbox` binary runs it over
/// stdin and stdout.
pub mod router;

pub use router::{dispatch, dispatch_line, run, Reply, ShellError};
