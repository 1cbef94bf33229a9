pub mod cfg;
pub mod codegen;
pub mod dot;
pub mod rtl;

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::{
    cfg::{liveness, Cfg},
    codegen::frame::RegisterMap,
    rtl::record::Record,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no instruction records recovered from the input")]
    NoRecords,

    #[error("{0}")]
    Liveness(#[from] liveness::LivenessError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Front half of the pipeline: parse and classify the dump, build the
/// block graph, run liveness, and discover stack homes. Records that fail
/// to parse are skipped with a warning; the run fails only when nothing
/// at all is recovered.
pub fn analyze<R: Read>(input: R) -> Result<(Cfg, RegisterMap), Error> {
    let mut records = Vec::new();
    for text in rtl::read_records(input)? {
        match Record::parse(&text) {
            Ok(record) => records.push(record),
            Err(err) => log::warn!("skipping record: {}", err),
        }
    }
    if records.is_empty() {
        return Err(Error::NoRecords);
    }

    let regs = RegisterMap::discover(&records);
    let mut cfg = Cfg::build(records);
    liveness::analyze(&mut cfg)?;
    for block in cfg.blocks() {
        log::debug!(
            "block {}: live_in={:?} live_out={:?}",
            block.num(),
            cfg.live_in(block.num()),
            cfg.live_out(block.num())
        );
    }

    Ok((cfg, regs))
}

/// Whole pipeline: one function's expand dump in, its assembly listing out.
pub fn compile<R: Read, W: Write>(input: R, mut output: W) -> Result<(), Error> {
    let (cfg, regs) = analyze(input)?;
    codegen::emit::write_function(&cfg, &regs, &mut output)?;
    Ok(())
}
