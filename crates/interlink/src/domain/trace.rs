//! Hop-by-hop trace identifiers and their call-chain scoped storage.
//!
//! A [`TraceId`] is a dot-delimited chain of five-character segments such as
//! `UICALL.C32PO.V40PO`. Every service that handles a request appends exactly
//! one segment, so the identifier alone shows the path a call took.
//!
//! The active identifier lives in call-chain scoped storage. Async chains use
//! a Tokio task-local entered through [`TraceContext::scope`]. Plain threads
//! with no Tokio runtime fall back to a thread-local binding. Tasks sharing a
//! runtime worker also share its thread, so inside a runtime the thread-local
//! is never consulted: an unscoped task reads no identifier and
//! [`set_trace_id`] fails with [`UnscopedTraceError`].
//!
//! Tokio task-local variables are not inherited across spawned tasks. Use
//! [`TraceContext::spawn`] (or wrap the future in [`TraceContext::scope`]) when
//! moving work onto a new task.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use rand::Rng;
use rand::rngs::OsRng;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::task_local;
use tracing::Instrument;

/// Header carrying the trace identifier between services.
pub const TRACE_ID_HEADER: &str = "X-Trace-ID";

/// Header naming the calling service. Used as a display label only.
pub const SERVICE_NAME_HEADER: &str = "X-Service-Name";

/// Separator placed between segments.
pub const SEGMENT_SEPARATOR: char = '.';

/// Number of characters in a generated segment.
pub const SEGMENT_LEN: usize = 5;

const SEGMENT_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

task_local! {
    static CHAIN_TRACE_ID: RefCell<Option<TraceId>>;
}

thread_local! {
    static THREAD_TRACE_ID: RefCell<Option<TraceId>> = const { RefCell::new(None) };
}

/// Errors raised when parsing trace identifiers or segments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceIdError {
    /// The identifier text was empty.
    #[error("trace identifier must not be empty")]
    Empty,
    /// A segment did not have the expected width.
    #[error("trace segment '{segment}' must be 5 characters long")]
    SegmentLength {
        /// The rejected segment.
        segment: String,
    },
    /// A segment contained characters outside `[A-Z0-9]`.
    #[error("trace segment '{segment}' must be uppercase alphanumeric")]
    SegmentAlphabet {
        /// The rejected segment.
        segment: String,
    },
}

/// Raised by [`set_trace_id`] when called from a Tokio task that is not
/// running inside a [`TraceContext`] scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "no trace scope is active for this task; run it through TraceContext::scope or \
     TraceContext::spawn"
)]
pub struct UnscopedTraceError;

/// One hop marker: five characters drawn from `[A-Z0-9]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceSegment(String);

impl TraceSegment {
    /// Generate a fresh segment from the operating system's CSPRNG.
    ///
    /// With 36^5 possible values, segments are statistically unique rather
    /// than globally unique.
    ///
    /// # Examples
    /// ```
    /// use interlink::domain::trace::TraceSegment;
    ///
    /// let segment = TraceSegment::generate();
    /// assert_eq!(segment.as_str().len(), 5);
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let segment = (0..SEGMENT_LEN)
            .map(|_| {
                let index = rng.gen_range(0..SEGMENT_ALPHABET.len());
                SEGMENT_ALPHABET.get(index).copied().map_or('0', char::from)
            })
            .collect();
        Self(segment)
    }

    /// Parse a segment, enforcing width and alphabet.
    ///
    /// # Errors
    ///
    /// Returns [`TraceIdError::SegmentLength`] or
    /// [`TraceIdError::SegmentAlphabet`] when the text is not a valid segment.
    pub fn parse(raw: &str) -> Result<Self, TraceIdError> {
        if raw.chars().count() != SEGMENT_LEN {
            return Err(TraceIdError::SegmentLength {
                segment: raw.to_owned(),
            });
        }
        if !raw
            .bytes()
            .all(|byte| byte.is_ascii_uppercase() || byte.is_ascii_digit())
        {
            return Err(TraceIdError::SegmentAlphabet {
                segment: raw.to_owned(),
            });
        }
        Ok(Self(raw.to_owned()))
    }

    /// Borrow the segment text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation identifier for one logical call chain.
///
/// Values are never mutated in place. Extending a chain with
/// [`append_segment`] or [`increment_trace_id`] yields a new `TraceId`.
///
/// # Examples
/// ```
/// use interlink::domain::trace::TraceId;
///
/// let id: TraceId = "UICALL.C32PO".parse().expect("non-empty id");
/// assert_eq!(id.segments().collect::<Vec<_>>(), ["UICALL", "C32PO"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    /// Borrow the dotted representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the segments in hop order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEGMENT_SEPARATOR)
    }

    /// Number of hops recorded in the identifier.
    #[must_use]
    pub fn hop_count(&self) -> usize {
        self.segments().count()
    }

    /// Returns the identifier bound to the calling chain, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        current_trace_id()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl FromStr for TraceId {
    type Err = TraceIdError;

    /// Accept any non-empty header value verbatim. Upstream callers may use
    /// their own root markers (for example `UICALL`), so only emptiness is
    /// rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TraceIdError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }
}

impl From<TraceSegment> for TraceId {
    fn from(segment: TraceSegment) -> Self {
        Self(segment.0)
    }
}

/// Generate a new random segment. Pure: touches no context.
#[must_use]
pub fn generate_segment() -> TraceSegment {
    TraceSegment::generate()
}

/// Append a segment to an existing identifier, returning a new identifier.
///
/// When `trace_id` is absent or empty the result is the segment alone, which
/// makes the caller the root of a new chain. A missing `segment` is generated.
///
/// # Examples
/// ```
/// use interlink::domain::trace::{append_segment, TraceId};
///
/// assert_eq!(append_segment(None, Some("BBB22")).as_str(), "BBB22");
///
/// let parent: TraceId = "AAA.11".parse().expect("non-empty id");
/// assert_eq!(append_segment(Some(&parent), Some("BBB22")).as_str(), "AAA.11.BBB22");
/// ```
#[must_use]
pub fn append_segment(trace_id: Option<&TraceId>, segment: Option<&str>) -> TraceId {
    let next = segment.map_or_else(|| generate_segment().0, str::to_owned);
    match trace_id.map(TraceId::as_str).filter(|raw| !raw.is_empty()) {
        Some(existing) => TraceId(format!("{existing}{SEGMENT_SEPARATOR}{next}")),
        None => TraceId(next),
    }
}

/// Add this hop's segment to an incoming identifier.
///
/// Semantically identical to [`append_segment`]; this is the entry point a
/// service uses at its inbound boundary before propagating further.
#[must_use]
pub fn increment_trace_id(incoming: Option<&TraceId>, segment: Option<&str>) -> TraceId {
    append_segment(incoming, segment)
}

/// Returns the identifier bound to the calling chain, if any.
#[must_use]
pub fn current_trace_id() -> Option<TraceId> {
    CHAIN_TRACE_ID
        .try_with(|slot| slot.borrow().clone())
        .unwrap_or_else(|_| with_thread_binding(|slot| slot.borrow().clone()).flatten())
}

/// Bind `trace_id` to the calling chain, replacing any previous binding in
/// that chain only.
///
/// # Errors
///
/// Returns [`UnscopedTraceError`] when called from a Tokio runtime outside any
/// [`TraceContext`] scope. Sibling tasks share the worker thread there, so no
/// chain-local slot exists to write to.
pub fn set_trace_id(trace_id: TraceId) -> Result<(), UnscopedTraceError> {
    let mut pending = Some(trace_id);
    let bound_to_task = CHAIN_TRACE_ID
        .try_with(|slot| {
            slot.replace(pending.take());
        })
        .is_ok();
    if bound_to_task {
        return Ok(());
    }
    with_thread_binding(|slot| {
        slot.replace(pending);
    })
    .ok_or(UnscopedTraceError)
}

/// Remove the calling chain's binding.
pub fn clear_trace_id() {
    if CHAIN_TRACE_ID
        .try_with(|slot| {
            slot.replace(None);
        })
        .is_err()
    {
        with_thread_binding(|slot| {
            slot.replace(None);
        });
    }
}

/// Apply `f` to the thread-local binding. Yields `None` on threads driving a
/// Tokio runtime.
fn with_thread_binding<R>(f: impl FnOnce(&RefCell<Option<TraceId>>) -> R) -> Option<R> {
    if Handle::try_current().is_ok() {
        return None;
    }
    Some(THREAD_TRACE_ID.with(f))
}

/// Entry points for running work as its own call chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceContext;

impl TraceContext {
    /// Execute `fut` as a separate call chain whose binding starts as
    /// `initial`. Calls to [`set_trace_id`] and [`clear_trace_id`] inside the
    /// future affect only this chain.
    ///
    /// # Examples
    /// ```
    /// use interlink::domain::trace::{current_trace_id, TraceContext, TraceId};
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let id: TraceId = "ROOT1".parse().expect("non-empty id");
    /// let observed = TraceContext::scope(Some(id.clone()), async { current_trace_id() }).await;
    /// assert_eq!(observed, Some(id));
    /// assert_eq!(current_trace_id(), None);
    /// # });
    /// ```
    pub async fn scope<Fut>(initial: Option<TraceId>, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        CHAIN_TRACE_ID.scope(RefCell::new(initial), fut).await
    }

    /// Spawn `fut` on the Tokio runtime, carrying the caller's current trace
    /// identifier and `tracing` span into the new task.
    pub fn spawn<Fut>(fut: Fut) -> JoinHandle<Fut::Output>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let inherited = current_trace_id();
        tokio::spawn(CHAIN_TRACE_ID.scope(RefCell::new(inherited), fut).in_current_span())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for trace identifiers and chain isolation.
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use rstest::rstest;

    fn id(raw: &str) -> TraceId {
        raw.parse().expect("valid trace id")
    }

    fn is_segment(raw: &str) -> bool {
        raw.len() == SEGMENT_LEN
            && raw
                .bytes()
                .all(|byte| byte.is_ascii_uppercase() || byte.is_ascii_digit())
    }

    #[test]
    fn generated_segments_use_the_segment_alphabet() {
        for _ in 0..200 {
            let segment = generate_segment();
            assert!(is_segment(segment.as_str()), "bad segment {segment}");
        }
    }

    #[test]
    fn generated_segments_are_statistically_unique() {
        let distinct: HashSet<String> = (0..50).map(|_| generate_segment().0).collect();
        assert!(distinct.len() >= 45, "only {} distinct", distinct.len());
    }

    #[rstest]
    #[case::absent(None, "BBB22")]
    #[case::nested(Some("AAA.11"), "AAA.11.BBB22")]
    #[case::upstream_root(Some("UICALL.C32PO"), "UICALL.C32PO.BBB22")]
    fn append_with_explicit_segment(#[case] existing: Option<&str>, #[case] expected: &str) {
        let parent = existing.map(id);
        assert_eq!(
            append_segment(parent.as_ref(), Some("BBB22")).as_str(),
            expected
        );
    }

    #[test]
    fn append_treats_empty_identifier_as_absent() {
        let empty = TraceId(String::new());
        assert_eq!(append_segment(Some(&empty), Some("START")).as_str(), "START");
    }

    #[test]
    fn append_generates_segment_when_missing() {
        let parent = id("AAA.11");
        let extended = append_segment(Some(&parent), None);
        let suffix = extended
            .as_str()
            .strip_prefix("AAA.11.")
            .expect("parent prefix is preserved");
        assert!(is_segment(suffix), "bad generated suffix {suffix}");
        assert_eq!(parent.as_str(), "AAA.11", "input is never mutated");
    }

    #[test]
    fn increment_matches_append() {
        let incoming = id("UICALL.C32PO");
        assert_eq!(
            increment_trace_id(Some(&incoming), Some("V40PO")),
            append_segment(Some(&incoming), Some("V40PO"))
        );
        assert_eq!(increment_trace_id(None, None).hop_count(), 1);
    }

    #[rstest]
    #[case::too_short("AB12")]
    #[case::too_long("ABC123")]
    fn parse_segment_rejects_wrong_width(#[case] raw: &str) {
        assert!(matches!(
            TraceSegment::parse(raw),
            Err(TraceIdError::SegmentLength { .. })
        ));
    }

    #[test]
    fn parse_segment_rejects_lowercase() {
        assert!(matches!(
            TraceSegment::parse("ab12c"),
            Err(TraceIdError::SegmentAlphabet { .. })
        ));
        assert!(TraceSegment::parse("AB12C").is_ok());
    }

    #[test]
    fn empty_header_values_are_rejected() {
        assert_eq!("  ".parse::<TraceId>(), Err(TraceIdError::Empty));
    }

    #[test]
    fn thread_binding_set_and_clear() {
        assert_eq!(current_trace_id(), None);
        set_trace_id(id("THRD1")).expect("plain threads bind");
        assert_eq!(current_trace_id(), Some(id("THRD1")));
        clear_trace_id();
        assert_eq!(current_trace_id(), None);
    }

    #[test]
    fn thread_bindings_do_not_leak_between_threads() {
        set_trace_id(id("MAIN1")).expect("plain threads bind");
        let observed = std::thread::spawn(current_trace_id)
            .join()
            .expect("thread completes");
        assert_eq!(observed, None);
        clear_trace_id();
    }

    #[tokio::test]
    async fn scope_isolates_set_and_clear() {
        let observed = TraceContext::scope(None, async {
            set_trace_id(id("TASK1")).expect("scoped chain binds");
            let bound = current_trace_id();
            clear_trace_id();
            (bound, current_trace_id())
        })
        .await;
        assert_eq!(observed, (Some(id("TASK1")), None));
        assert_eq!(current_trace_id(), None, "scope binding must not escape");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_chains_never_observe_each_other() {
        let handles: Vec<_> = (0..32)
            .map(|index| {
                tokio::spawn(TraceContext::scope(None, async move {
                    let own = increment_trace_id(None, None);
                    set_trace_id(own.clone()).expect("scoped chain binds");
                    for _ in 0..5 {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        assert_eq!(current_trace_id(), Some(own.clone()), "chain {index}");
                    }
                    own
                }))
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            seen.insert(handle.await.expect("chain completes"));
        }
        assert!(seen.len() >= 30);
    }

    #[tokio::test]
    async fn unscoped_sibling_tasks_share_no_binding() {
        let writer = tokio::spawn(async {
            let outcome = set_trace_id(id("AAAAA"));
            tokio::task::yield_now().await;
            outcome
        });
        let reader = tokio::spawn(async {
            tokio::task::yield_now().await;
            current_trace_id()
        });

        assert_eq!(reader.await.expect("reader completes"), None);
        assert_eq!(
            writer.await.expect("writer completes"),
            Err(UnscopedTraceError)
        );
        assert_eq!(current_trace_id(), None);
    }

    #[tokio::test]
    async fn unscoped_runtime_code_ignores_thread_bindings() {
        clear_trace_id();
        assert_eq!(set_trace_id(id("MAIN2")), Err(UnscopedTraceError));
        let scoped = TraceContext::scope(None, async {
            set_trace_id(id("TASK2")).map(|()| current_trace_id())
        })
        .await;
        assert_eq!(scoped, Ok(Some(id("TASK2"))));
    }

    #[tokio::test]
    async fn spawn_carries_the_current_identifier() {
        let observed = TraceContext::scope(Some(id("PARNT")), async {
            TraceContext::spawn(async { current_trace_id() })
                .await
                .expect("task completes")
        })
        .await;
        assert_eq!(observed, Some(id("PARNT")));
    }
}
