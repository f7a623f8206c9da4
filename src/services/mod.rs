pub mod comment_service;
pub mod memory_vote_store;
pub mod post_service;
pub mod score_service;
pub mod vote_ledger;
pub mod vote_loader;
pub mod vote_service;
pub mod vote_store;
