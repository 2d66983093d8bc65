//! These models represent the objects passed around by the control loop
//!
//! There are a few related formats we need to interact with:
//! - wire messages (`{"role": "user", "content": "..."}`) sent by callers of a turn
//! - openai-compatible messages/tools, sent from the loop to the LLM
//! - retrieval requests, sent from the loop to the document store
//!
//! We always immediately convert those data models into the internal structs using
//! to/from helpers, so the rest of the crate only deals with these types.
pub mod message;
pub mod role;
pub mod tool;
