//! Transaction submission: call building, assembly, fee guarding and broadcast

mod assembler;
mod call;
mod envelope;
mod fee;
mod hash;
mod pipeline;

pub use assembler::{encode_execute_calldata, TransactionAssembler};
pub use call::{parse_address, parse_felt, selector_from_name, CallDescriptor};
pub use envelope::TransactionEnvelope;
pub use fee::{corrected_cap, FeeGuard, FeeReport, GuardedEnvelope};
pub use hash::{invoke_v1_hash, parse_chain_id};
pub use pipeline::{
    PipelineConfig, StatusReport, SubmissionPipeline, SubmissionResult, SubmissionStage,
    UnknownStatus,
};
