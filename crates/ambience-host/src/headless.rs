use ambience_core::ParticleInstance;
use ambience_platform::{Result, SurfaceHost, Viewport};
use tracing::trace;

/// Surface host without a display; keeps the last presented frame.
#[derive(Debug, Clone)]
pub struct HeadlessHost {
    viewport: Viewport,
    available: bool,
    attached: bool,
    visible: bool,
    frames: u64,
    last_frame: Vec<ParticleInstance>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new(Viewport {
            width: 1280,
            height: 720,
        })
    }
}

impl HeadlessHost {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            available: true,
            attached: false,
            visible: true,
            frames: 0,
            last_frame: Vec::new(),
        }
    }

    /// A host whose container is not there yet.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
        if !available {
            self.attached = false;
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_frame(&self) -> &[ParticleInstance] {
        &self.last_frame
    }

    /// The last frame as raw instance bytes.
    pub fn last_frame_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.last_frame)
    }
}

impl SurfaceHost for HeadlessHost {
    fn attach(&mut self) -> Result<Viewport> {
        if !self.available {
            return Err("no container for the mounting surface".into());
        }
        self.attached = true;
        Ok(self.viewport)
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.visible = visible;
        if !visible {
            self.last_frame.clear();
        }
        Ok(())
    }

    fn present(&mut self, frame: &[ParticleInstance]) -> Result<()> {
        self.frames += 1;
        self.last_frame.clear();
        self.last_frame.extend_from_slice(frame);
        trace!(frame = self.frames, particles = frame.len(), "present");
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        self.attached = false;
        self.last_frame.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn unavailable_host_refuses_to_attach_until_available() {
        let mut host = HeadlessHost::unavailable();
        assert!(host.attach().is_err());
        host.set_available(true);
        assert!(host.attach().is_ok());
        assert!(host.is_attached());
    }

    #[test]
    fn frames_are_recorded_as_bytes() {
        let mut host = HeadlessHost::default();
        let particle = ParticleInstance {
            pos_size: [0.5, 0.5, 0.01, 0.0],
            color: [1.0; 4],
            rotation_layer: [0.0; 4],
        };
        host.present(&[particle, particle]).unwrap();
        assert_eq!(host.frames(), 1);
        assert_eq!(host.last_frame().len(), 2);
        assert_eq!(host.last_frame_bytes().len(), 2 * size_of::<ParticleInstance>());
    }
}
