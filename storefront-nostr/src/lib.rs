mod mirror;
mod relay_pool;

pub use mirror::{
    comment_event, content_hash, issue_comment_proof, product_event, stall_event,
    verify_comment_event, verify_comment_proof, CommentProof, ProductPayload, StallPayload,
    COMMENT_KIND, PRODUCT_KIND, STALL_KIND,
};
pub use relay_pool::{RelayAck, RelayPool};
