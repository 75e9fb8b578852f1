//! Stages executable images from a process memory map for offline Intel PT
//! decoding, and writes the decoder command line that loads them.

pub mod map;
pub mod script;
pub mod stage;
