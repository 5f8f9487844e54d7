#![allow(dead_code)]

pub mod drawings;
pub mod scribble_env;
