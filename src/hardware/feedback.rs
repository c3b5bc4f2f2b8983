// src/hardware/feedback.rs - Tagged feedback frame grammar
//
// Frames are comma-separated, keyed by a one-letter tag:
//   m,<id>,<angle>           generic string motor
//   h,<angle>                head
//   s,<angle>                shoulder
//   e,<x>,<y>                both eyes combined
//   i,<roll>,<pitch>,<yaw>   IMU telemetry (marks head data updated)

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Feedback {
    Motor { id: u8, angle: f64 },
    Head(f64),
    Shoulder(f64),
    Eyes { x: f64, y: f64 },
    Imu { roll: f64, pitch: f64, yaw: f64 },
}

/// Parses one raw frame. Malformed or unknown frames return `None`; the
/// caller logs and drops them.
pub fn parse(frame: &str) -> Option<Feedback> {
    let mut parts = frame.trim().split(',');
    let tag = parts.next()?.trim();
    let mut next = || -> Option<f64> { parts.next()?.trim().parse().ok() };
    let parsed = match tag {
        "m" => {
            let id = next()?;
            // Bounds-checked before narrowing: out-of-range ids must not
            // wrap onto another channel.
            if !(0.0..=255.0).contains(&id) || id.fract() != 0.0 {
                return None;
            }
            Feedback::Motor {
                id: id as u8,
                angle: next()?,
            }
        }
        "h" => Feedback::Head(next()?),
        "s" => Feedback::Shoulder(next()?),
        "e" => Feedback::Eyes {
            x: next()?,
            y: next()?,
        },
        "i" => Feedback::Imu {
            roll: next()?,
            pitch: next()?,
            yaw: next()?,
        },
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_frame_parses() {
        assert_eq!(parse("h,20"), Some(Feedback::Head(20.0)));
        assert_eq!(parse(" h , 20.5 "), Some(Feedback::Head(20.5)));
    }

    #[test]
    fn eye_frame_parses_both_axes() {
        assert_eq!(parse("e,30,40"), Some(Feedback::Eyes { x: 30.0, y: 40.0 }));
    }

    #[test]
    fn motor_frame_carries_channel_id() {
        assert_eq!(
            parse("m,5,-12.5"),
            Some(Feedback::Motor { id: 5, angle: -12.5 })
        );
    }

    #[test]
    fn imu_frame_parses() {
        assert_eq!(
            parse("i,1.0,-2.0,3.5"),
            Some(Feedback::Imu {
                roll: 1.0,
                pitch: -2.0,
                yaw: 3.5
            })
        );
    }

    #[test]
    fn shoulder_frame_parses() {
        assert_eq!(parse("s,7"), Some(Feedback::Shoulder(7.0)));
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("x,1"), None);
        assert_eq!(parse("h"), None);
        assert_eq!(parse("h,abc"), None);
        assert_eq!(parse("e,30"), None);
        assert_eq!(parse("h,20,extra"), None);
        assert_eq!(parse("m,2.5,10"), None);
        // Ids past u8 range must be rejected, not wrapped onto another
        // channel (258 would otherwise truncate to 2, the torso).
        assert_eq!(parse("m,258,50"), None);
        assert_eq!(parse("m,-1,50"), None);
    }
}
