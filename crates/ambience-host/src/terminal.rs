use std::io::{self, Write};

use ambience_core::ParticleInstance;
use ambience_platform::{Result, SurfaceHost, Viewport};

const RAMP: [char; 5] = ['.', ':', '*', 'o', '@'];

/// Draws frames as characters, one cell per grid position.
pub struct TerminalHost {
    viewport: Viewport,
    out: Box<dyn Write + Send>,
    visible: bool,
}

impl TerminalHost {
    pub fn stdout(width: u32, height: u32) -> Self {
        Self::with_writer(Box::new(io::stdout()), width, height)
    }

    pub fn with_writer(out: Box<dyn Write + Send>, width: u32, height: u32) -> Self {
        Self {
            viewport: Viewport {
                width: width.max(1),
                height: height.max(1),
            },
            out,
            visible: true,
        }
    }
}

/// Rasterizes a frame into `height` lines of `width` cells. Brighter particles
/// win a shared cell.
pub fn render_frame(frame: &[ParticleInstance], width: u32, height: u32) -> String {
    let (w, h) = (width.max(1) as usize, height.max(1) as usize);
    let mut cells = vec![0.0_f32; w * h];
    for particle in frame {
        let [x, y, _, _] = particle.pos_size;
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            continue;
        }
        let col = ((x * w as f32) as usize).min(w - 1);
        let row = ((y * h as f32) as usize).min(h - 1);
        let alpha = particle.color[3];
        let cell = &mut cells[row * w + col];
        *cell = cell.max(alpha);
    }
    let mut text = String::with_capacity((w + 1) * h);
    for row in cells.chunks(w) {
        for &alpha in row {
            text.push(if alpha <= 0.0 {
                ' '
            } else {
                let index = (alpha.clamp(0.0, 1.0) * (RAMP.len() - 1) as f32).round() as usize;
                RAMP[index]
            });
        }
        text.push('\n');
    }
    text
}

impl SurfaceHost for TerminalHost {
    fn attach(&mut self) -> Result<Viewport> {
        Ok(self.viewport)
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.visible = visible;
        if !visible {
            write!(self.out, "\x1b[H\x1b[2J")?;
            self.out.flush()?;
        }
        Ok(())
    }

    fn present(&mut self, frame: &[ParticleInstance]) -> Result<()> {
        if !self.visible {
            return Ok(());
        }
        let text = render_frame(frame, self.viewport.width, self.viewport.height);
        write!(self.out, "\x1b[H{text}")?;
        self.out.flush()?;
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        write!(self.out, "\x1b[H\x1b[2J")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(x: f32, y: f32, alpha: f32) -> ParticleInstance {
        ParticleInstance {
            pos_size: [x, y, 0.01, 0.0],
            color: [1.0, 1.0, 1.0, alpha],
            rotation_layer: [0.0; 4],
        }
    }

    #[test]
    fn particles_land_in_their_cells() {
        let text = render_frame(&[particle(0.0, 0.0, 1.0), particle(0.99, 0.99, 0.25)], 4, 2);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec!["@   ", "   :"]);
    }

    #[test]
    fn off_surface_particles_are_skipped() {
        let text = render_frame(&[particle(-0.2, 0.5, 1.0), particle(0.5, 1.4, 1.0)], 3, 1);
        assert_eq!(text, "   \n");
    }
}
