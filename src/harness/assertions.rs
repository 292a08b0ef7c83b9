//! Ordering assertions returning harness errors instead of panicking.

use std::fmt::Display;

use super::errors::{HarnessError, HarnessResult};

pub fn assert_less_than<T: PartialOrd + Display>(a: T, b: T, msg: Option<&str>) -> HarnessResult<()> {
    if a < b {
        Ok(())
    } else {
        Err(HarnessError::Assertion(
            msg.map(str::to_string)
                .unwrap_or_else(|| format!("{a} not less than {b}")),
        ))
    }
}

pub fn assert_less_than_equal<T: PartialOrd + Display>(a: T, b: T, msg: Option<&str>) -> HarnessResult<()> {
    if a <= b {
        Ok(())
    } else {
        Err(HarnessError::Assertion(
            msg.map(str::to_string)
                .unwrap_or_else(|| format!("{a} not less than or equal to {b}")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_less_than() {
        assert!(assert_less_than(1, 2, None).is_ok());
        let err = assert_less_than(2, 2, None).unwrap_err();
        assert_eq!(err.to_string(), "assertion failed: 2 not less than 2");
    }

    #[test]
    fn test_less_than_equal_with_message() {
        assert!(assert_less_than_equal(2.0, 2.0, None).is_ok());
        let err = assert_less_than_equal(3, 2, Some("too slow")).unwrap_err();
        assert_eq!(err.to_string(), "assertion failed: too slow");
    }
}
