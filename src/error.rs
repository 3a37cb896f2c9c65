use std::error::Error;
use std::fmt::Write;

/// Turns a failed [`Result`] into a logged `None` for call sites where the failure must not
/// propagate (e.g. a single scrape cycle).
pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{}", error_chain(&err));
                None
            }
        }
    }
}

/// Renders `err` followed by its `source()` chain, skipping sources whose message is already
/// part of the rendered text.
pub fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !out.contains(&cause_text) {
            let _ = write!(out, ": caused by: {cause_text}");
        }
        source = cause.source();
    }
    out
}
