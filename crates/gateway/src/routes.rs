//! Peer HTTP routes

/// Paths every peer kind serves, relative to its endpoint
///
/// Kept relative so endpoints mounted under a prefix
/// (`http://host/ondemand/`) resolve correctly.
pub struct Routes;

impl Routes {
    // Lifecycle

    /// Liveness probe carrying the peer's setup details
    pub const SETUP: &'static str = "setup";

    /// Event stream closed
    pub const FINISH: &'static str = "finish";

    // Synchronization

    /// Next time the peer wants to act
    pub const PEEK: &'static str = "peek";

    /// Process up to a time and return emitted events
    pub const ADVANCE: &'static str = "advance";

    /// Delivery of one merged event
    pub const TRIGGERED: &'static str = "triggered";

    // Queries

    /// Booking request to a mobility peer
    pub const RESERVATIONS: &'static str = "reservations";

    /// Reservability check: `reservable?org=A&dst=B`
    pub fn reservable(org: &str, dst: &str) -> String {
        format!(
            "reservable?{}",
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair("org", org)
                .append_pair("dst", dst)
                .finish()
        )
    }

    /// Route planning query on a planner peer
    pub const PLAN: &'static str = "plan";

    // Writer

    /// Batched event log upload
    pub const RESULT_EVENTS: &'static str = "result/events/";
}
