//! # livecheck-client: terminal front end
//!
//! Loads the TOML configuration, replays a directory of JPEG stills as
//! the camera, and prints the session state each time the service
//! updates it. Keyboard actions restart the check or save the verified
//! photo.

pub mod config;
pub mod render;
