/// Rotary encoder quadrature decoder, one count per detent.
///
/// Counts only on a CLK falling edge; DT high at that moment is clockwise.
/// Edges closer than `spacing_us` to the last counted one are ignored
/// outright, and a change of direction needs `reversal_us`.
pub struct QuadratureDecoder {
    /// `(clk << 1) | dt`
    state: u8,
    last_direction: i8,
    last_valid_us: Option<u32>,
    spacing_us: u32,
    reversal_us: u32,
}

impl QuadratureDecoder {
    pub const fn new(clk: bool, dt: bool, spacing_us: u32, reversal_us: u32) -> Self {
        Self {
            state: Self::pack(clk, dt),
            last_direction: 0,
            last_valid_us: None,
            spacing_us,
            reversal_us,
        }
    }

    const fn pack(clk: bool, dt: bool) -> u8 {
        ((clk as u8) << 1) | dt as u8
    }

    /// Feed the current line levels. Returns `+1`/`-1` for an accepted step.
    pub fn on_edge(&mut self, clk: bool, dt: bool, now_us: u32) -> Option<i8> {
        let since_valid = self.last_valid_us.map(|at| now_us.wrapping_sub(at));
        if since_valid.is_some_and(|dt_us| dt_us < self.spacing_us) {
            return None;
        }

        let current = Self::pack(clk, dt);
        if current == self.state {
            return None;
        }

        let falling_clk = self.state & 0b10 != 0 && !clk;
        if !falling_clk {
            self.state = current;
            return None;
        }

        let direction: i8 = if dt { 1 } else { -1 };
        let reversed = self.last_direction != 0 && direction != self.last_direction;
        if reversed && since_valid.is_some_and(|dt_us| dt_us < self.reversal_us) {
            self.state = current;
            return None;
        }

        self.last_direction = direction;
        self.last_valid_us = Some(now_us);
        self.state = current;
        Some(direction)
    }
}
