//! Builds batch job scripts for cluster queuing systems.
//!
//! A job type fills a [`core::resources::ResourceRequest`] (from the
//! commandline and its input file), registers priority-ordered hooks in a
//! [`builders::hooks::HookRegistry`], and the
//! [`core::engine::ScriptAssembler`] renders them into one shell script.
pub mod builders;
pub mod core;
pub mod utils;
