//! Property-based tests for the isolated-script protocol
//!
//! These use proptest to check the classifier over arbitrary script output.

use hubcheck::harness::{HarnessError, ProtocolVerdict, classify};
use proptest::prelude::*;

/// Lines that never classify as pass or skip on their own.
fn noise_line() -> impl Strategy<Value = String> {
    "[a-z0-9 =:.]{0,30}".prop_filter("not a protocol line", |l| {
        let t = l.trim_end();
        t != "pass" && !t.starts_with("skip")
    })
}

proptest! {
    /// Property: whatever precedes it, a final `pass` line passes
    #[test]
    fn trailing_pass_always_passes(prefix in prop::collection::vec(noise_line(), 0..8), blank in 0usize..4) {
        let mut output = prefix.join("\n");
        output.push_str("\npass\n");
        output.push_str(&"\n".repeat(blank));
        prop_assert_eq!(classify(output.as_bytes()), ProtocolVerdict::Pass);
    }

    /// Property: the skip reason is the trimmed text after the first colon
    #[test]
    fn skip_reason_is_trimmed_suffix(reason in "[a-z][a-z0-9 -]{0,20}[a-z]") {
        let output = format!("noise\nskip:  {reason} \n");
        prop_assert_eq!(classify(output.as_bytes()), ProtocolVerdict::Skip(Some(reason)));
    }

    /// Property: anything else fails and keeps the full output
    #[test]
    fn other_output_fails_verbatim(lines in prop::collection::vec(noise_line(), 0..8)) {
        let output = lines.join("\n");
        let verdict = classify(output.as_bytes());
        prop_assert_eq!(&verdict, &ProtocolVerdict::Fail(output.clone()));

        let err = verdict.into_result().unwrap_err();
        let kept_output = matches!(err, HarnessError::SubprocessProtocolFailure { output: ref o } if *o == output);
        prop_assert!(kept_output, "unexpected error: {}", err);
    }

    /// Property: classification never panics, whatever the bytes
    #[test]
    fn arbitrary_bytes_classify(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = classify(&data);
    }
}
