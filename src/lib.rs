// marionette-host: motion control core for a string marionette
//
// Converts desired poses into physically safe, time-bounded, hardware
// synchronized motor commands and delivers them over a single serial link
// while reconciling commanded state against measured feedback.

pub mod config;
pub mod error;
pub mod gestures;
pub mod hardware;
pub mod kinematics;
pub mod motion;
pub mod positions;
pub mod scheduler;
pub mod tracking;

pub use error::HostError;
pub use kinematics::{Channel, Marionette, Pose};
pub use scheduler::MotionScheduler;
