use thiserror::Error;

/// Recompiler errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("ELF error: {0}")]
    Elf(#[from] mrc_elf::ElfError),
    #[error("analysis error: {0}")]
    Analysis(#[from] mrc_cfg::AnalysisError),
    #[error("emit error: {0}")]
    Emit(#[from] mrc_emit::EmitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
