// Utility functions
pub mod slug;
pub mod validation;
