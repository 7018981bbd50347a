pub mod controller;
pub mod foreground;
pub mod intervention;
pub mod loop_worker;

pub use controller::EnforcementController;
pub use foreground::{
    ForegroundSample, ForegroundSampler, ForegroundSource, NullUsageEvents, UsageEvent,
    UsageEventKind, UsageEventSource,
};
pub use intervention::{InterventionSurface, LoggingInterventionSurface};
pub use loop_worker::{Debouncer, EnforcementContext, LoopExit};
