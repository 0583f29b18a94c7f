use anyhow::Result;
use serde::Serialize;

use crate::output::config::OutputConfig;
use crate::output::types::{Envelope, Meta};
use crate::output::Emitter;

pub fn print_plan<T: Serialize>(op: &'static str, plan: &T, meta: Option<Meta>) -> Result<()> {
    let env = Envelope::plan(op, plan, meta)?;
    emitter().emit(&env)?;
    Ok(())
}

pub fn print_result<T: Serialize>(op: &'static str, result: &T, meta: Option<Meta>) -> Result<()> {
    let env = Envelope::result(op, result, meta)?;
    emitter().emit(&env)?;
    Ok(())
}

fn emitter() -> Emitter {
    Emitter::from_env(OutputConfig::from_env())
}
