//! Small helpers shared by the codecs.

/// Returns `Err($error)` from the enclosing function unless `$predicate` holds.
///
/// Keeps the many wire-format checks of the decoders on one line each:
///
/// ```ignore
/// ensure!(payload.len() == 8, ParseError::invalid_frame("ping payload must be 8 bytes"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr $(,)?) => {
        if !($predicate) {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
