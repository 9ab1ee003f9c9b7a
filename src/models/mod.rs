// src/models/mod.rs

pub mod attempt;
pub mod event;
pub mod exam;
pub mod paper;
pub mod question;
pub mod session;
