/// State that drops stale entries on a timer.
pub trait Sweepable: Send {
    /// Short label used in logs.
    fn label(&self) -> &'static str;

    /// Remove entries that are stale at `now_ms`; returns how many were removed.
    fn sweep(&mut self, now_ms: u64) -> usize;
}
