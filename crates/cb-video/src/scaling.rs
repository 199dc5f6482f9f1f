//! Placement of a frame inside the viewport

/// How the frame is scaled to the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingMode {
    /// Largest whole multiple that fits, centred
    Integer,
    /// Largest size with the frame's aspect ratio, centred
    AspectFit,
    /// Fill the viewport
    Stretch,
}

impl ScalingMode {
    /// Mode implied by the two lock options. Integer scaling wins.
    pub fn from_locks(integer: bool, lock_aspect: bool) -> Self {
        if integer {
            ScalingMode::Integer
        } else if lock_aspect {
            ScalingMode::AspectFit
        } else {
            ScalingMode::Stretch
        }
    }
}

/// Destination rectangle in viewport pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where a `frame` sized image lands in a `viewport` sized target
pub fn place(mode: ScalingMode, frame: (u32, u32), viewport: (u32, u32)) -> Rect {
    let (fw, fh) = frame;
    let (vw, vh) = viewport;
    if fw == 0 || fh == 0 || vw == 0 || vh == 0 {
        return Rect::default();
    }

    let (width, height) = match mode {
        ScalingMode::Stretch => (vw, vh),
        ScalingMode::Integer => match (vw / fw).min(vh / fh) {
            // Frame larger than the viewport
            0 => aspect_fit(frame, viewport),
            factor => (fw * factor, fh * factor),
        },
        ScalingMode::AspectFit => aspect_fit(frame, viewport),
    };

    Rect {
        x: (vw - width) / 2,
        y: (vh - height) / 2,
        width,
        height,
    }
}

fn aspect_fit((fw, fh): (u32, u32), (vw, vh): (u32, u32)) -> (u32, u32) {
    let (fw, fh, vw, vh) = (fw as u64, fh as u64, vw as u64, vh as u64);
    if vw * fh <= vh * fw {
        (vw as u32, (vw * fh / fw).max(1) as u32)
    } else {
        ((vh * fw / fh).max(1) as u32, vh as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_scaling() {
        let rect = place(ScalingMode::Integer, (240, 160), (800, 600));
        assert_eq!(
            rect,
            Rect {
                x: 40,
                y: 60,
                width: 720,
                height: 480
            }
        );
    }

    #[test]
    fn test_aspect_fit() {
        let rect = place(ScalingMode::AspectFit, (240, 160), (800, 600));
        assert_eq!(
            rect,
            Rect {
                x: 0,
                y: 33,
                width: 800,
                height: 533
            }
        );

        // Tall viewport pillarboxes the other way round
        let rect = place(ScalingMode::AspectFit, (160, 144), (1000, 288));
        assert_eq!((rect.width, rect.height), (320, 288));
        assert_eq!((rect.x, rect.y), (340, 0));
    }

    #[test]
    fn test_integer_falls_back_when_frame_too_large() {
        let rect = place(ScalingMode::Integer, (240, 160), (200, 200));
        assert_eq!(rect, place(ScalingMode::AspectFit, (240, 160), (200, 200)));
        assert_eq!(rect.width, 200);
    }

    #[test]
    fn test_stretch_fills() {
        let rect = place(ScalingMode::Stretch, (160, 144), (640, 480));
        assert_eq!(
            rect,
            Rect {
                x: 0,
                y: 0,
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn test_degenerate_sizes() {
        assert!(place(ScalingMode::Integer, (0, 0), (800, 600)).is_empty());
        assert!(place(ScalingMode::AspectFit, (240, 160), (0, 600)).is_empty());
    }

    #[test]
    fn test_mode_from_locks() {
        assert_eq!(ScalingMode::from_locks(true, false), ScalingMode::Integer);
        assert_eq!(ScalingMode::from_locks(false, true), ScalingMode::AspectFit);
        assert_eq!(ScalingMode::from_locks(false, false), ScalingMode::Stretch);
    }
}
