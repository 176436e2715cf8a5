//! Test assertions for streams.

use crate::stream::Stream;
use std::fmt::Debug;
use std::time::Duration;

/// Reads `stream` until it closes, panicking if that takes longer than `limit`.
///
/// # Panics
///
/// Panics if the stream is still open after `limit`.
pub async fn collect_within<T>(stream: &mut Stream<T>, limit: Duration) -> Vec<T> {
    let mut values = Vec::new();
    let drained = tokio::time::timeout(limit, async {
        while let Some(value) = stream.recv().await {
            values.push(value);
        }
    })
    .await;

    assert!(
        drained.is_ok(),
        "Stream did not close within {limit:?}; received {} element(s)",
        values.len()
    );
    values
}

/// Asserts that `stream` yields exactly `expected` and then closes within `limit`.
///
/// # Panics
///
/// Panics if the elements differ or the stream does not close in time.
pub async fn assert_stream_yields<T>(mut stream: Stream<T>, expected: &[T], limit: Duration)
where
    T: Debug + PartialEq,
{
    let values = collect_within(&mut stream, limit).await;
    assert_eq!(
        values, expected,
        "Stream yielded {values:?}, expected {expected:?}"
    );
    assert!(stream.is_closed(), "Stream is not closed after draining");
}
