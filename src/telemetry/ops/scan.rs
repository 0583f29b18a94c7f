use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Scan;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Authenticate, FetchListing, Post, Resolve, Build, Complete, Parse, Emit }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::Authenticate => "authenticate",
        Phase::FetchListing => "fetch_listing",
        Phase::Post => "post",
        Phase::Resolve => "resolve",
        Phase::Build => "build",
        Phase::Complete => "complete",
        Phase::Parse => "parse",
        Phase::Emit => "emit",
    }}
    fn span(&self) -> Span { match self {
        Phase::Authenticate => info_span!("authenticate"),
        Phase::FetchListing => info_span!("fetch_listing"),
        Phase::Post => info_span!("post"),
        Phase::Resolve => info_span!("resolve"),
        Phase::Build => info_span!("build"),
        Phase::Complete => info_span!("complete"),
        Phase::Parse => info_span!("parse"),
        Phase::Emit => info_span!("emit"),
    }}
}

impl OpMarker for Scan {
    const NAME: &'static str = "scan";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("scan") }
}
