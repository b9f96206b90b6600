//! This module provides ways to control hardware on a running Linux system
pub mod class;
