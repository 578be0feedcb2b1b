/// Reserved `result_message` values written when the engine itself gives up on a job.
pub struct FailureReason;

impl FailureReason {
    /// Every dispatch attempt failed.
    pub const DISPATCH_EXHAUSTED: &'static str = "dispatch_exhausted";
    /// Job was dispatched but the external workflow never called back.
    pub const CALLBACK_TIMEOUT: &'static str = "callback_timeout";
    /// Job stayed queued past the maximum queued age without being dispatched.
    pub const QUEUE_TIMEOUT: &'static str = "queue_timeout";

    pub const ALL: &'static [&'static str] = &[
        Self::DISPATCH_EXHAUSTED,
        Self::CALLBACK_TIMEOUT,
        Self::QUEUE_TIMEOUT,
    ];

    pub fn is_reserved(reason: &str) -> bool {
        Self::ALL.contains(&reason)
    }
}
