//! Station protocol engine for the 5250 twinax converter
//!
//! One [`StationEngine`] per configured address drives the request/response
//! protocol with that terminal: polling, initialization, screen write
//! bursts and failure recovery. Engines never block and never return
//! errors; failures surface as [`EngineEvent`]s for the scheduler, which
//! isolates every station from its neighbours.

pub mod engine;

pub use engine::{
    Action, EngineEvent, EngineState, InitStep, OfflineReason, PollCadence, ScreenWrite,
    StationEngine, COMMAND_BACKLOG_MAX,
};
