use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Extract;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    Build,
    Complete,
    Parse,
    Output,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::Complete => "complete",
            Phase::Parse => "parse",
            Phase::Output => "output",
        }
    }

    fn span(&self) -> Span {
        match self {
            Phase::Build => info_span!("build"),
            Phase::Complete => info_span!("complete"),
            Phase::Parse => info_span!("parse"),
            Phase::Output => info_span!("output"),
        }
    }
}

impl OpMarker for Extract {
    const NAME: &'static str = "extract";
    type Phase = Phase;

    fn root_span() -> Span {
        info_span!("extract")
    }
}
