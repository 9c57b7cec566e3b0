//! Panic capture for step bodies and observers.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Formats a panic payload into a readable message.
///
/// `&str` and `String` payloads are returned as-is; anything else is
/// reported generically since `Any` offers no way to print it.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

/// Runs `f`, turning a panic into its message.
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_payloads_are_extracted() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*literal), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*owned), "bang");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*other), "non-string panic payload");
    }

    #[test]
    fn catch_returns_value_or_message() {
        assert_eq!(catch(|| 7), Ok(7));
        assert_eq!(
            catch(|| -> u8 { panic!("step exploded") }),
            Err("step exploded".to_owned())
        );
    }
}
