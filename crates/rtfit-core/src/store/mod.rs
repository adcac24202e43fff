//! Persistent state of a fitting run: generations, tables and GA state.

pub mod generation;
pub mod run;
pub mod tables;

pub use generation::{Generation, GenerationInfo, GenerationStatus};
pub use run::{
    EvaluatedModel, FittingRun, FreeParameter, RepresentationSpec, RunDefinition,
    INITIAL_GENERATION,
};
pub use tables::{
    ChiSquaredTable, GenerationRecord, GenerationsTable, IndividualsTable, MemoryRecord,
    MemoryTable, ParametersTable, TimingTable,
};
