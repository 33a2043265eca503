mod demote_transients;
mod interleave_banks;
mod offload_state;

pub use demote_transients::demote_unshared_transients;
pub use interleave_banks::interleave_banks_round_robin;
pub use offload_state::{OffloadStateToAccel, PROXY_PREFIX};
