// The grid: one row per instrument, `step_count` cells per row.

use rand::Rng;

use crate::config::StepRange;
use crate::error::{MachineError, MachineResult};
use crate::shared::{Instrument, TRACK_COUNT};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    rows: [Vec<bool>; TRACK_COUNT],
    step_count: usize,
}

impl Pattern {
    pub fn new(step_count: usize) -> Self {
        Self {
            rows: std::array::from_fn(|_| vec![false; step_count]),
            step_count,
        }
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn row(&self, instrument: Instrument) -> &[bool] {
        &self.rows[instrument.index()]
    }

    pub fn get(&self, instrument: Instrument, step: usize) -> bool {
        self.rows[instrument.index()].get(step).copied().unwrap_or(false)
    }

    pub fn set(&mut self, instrument: Instrument, step: usize, active: bool) -> MachineResult<()> {
        let cell = self.cell_mut(instrument, step)?;
        *cell = active;
        Ok(())
    }

    /// Flip one cell and return its new state.
    pub fn toggle(&mut self, instrument: Instrument, step: usize) -> MachineResult<bool> {
        let cell = self.cell_mut(instrument, step)?;
        *cell = !*cell;
        Ok(*cell)
    }

    fn cell_mut(&mut self, instrument: Instrument, step: usize) -> MachineResult<&mut bool> {
        let step_count = self.step_count;
        self.rows[instrument.index()]
            .get_mut(step)
            .ok_or(MachineError::StepOutOfRange { step, step_count })
    }

    /// Instruments with an active cell at `step`, in track order.
    pub fn active_at(&self, step: usize) -> Vec<Instrument> {
        Instrument::ALL
            .into_iter()
            .filter(|&i| self.get(i, step))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.rows.iter().flatten().filter(|&&on| on).count()
    }

    /// Change the number of steps, carrying cells over proportionally.
    ///
    /// Shrinking keeps the cell at `floor(new_col * old / new)`. Growing
    /// only copies a cell when `new_col * old / new` is a whole column, so
    /// a shrink followed by a grow back restores every column the shrink
    /// kept. Other columns start inactive; this is lossy in general.
    pub fn resize(&mut self, new_count: usize, range: &StepRange) -> MachineResult<()> {
        if !range.contains(new_count) {
            return Err(MachineError::InvalidStepCount {
                requested: new_count,
                min: range.min,
                max: range.max,
                increment: range.increment,
            });
        }
        let old_count = self.step_count;
        if new_count == old_count {
            return Ok(());
        }
        // build the whole grid before swapping it in
        let rows = std::array::from_fn(|track| {
            let old = &self.rows[track];
            (0..new_count)
                .map(|col| source_column(col, old_count, new_count).is_some_and(|src| old[src]))
                .collect()
        });
        self.rows = rows;
        self.step_count = new_count;
        Ok(())
    }

    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.fill(false);
        }
    }

    /// Play every row backwards.
    pub fn reverse(&mut self) {
        for row in &mut self.rows {
            row.reverse();
        }
    }

    /// Replace the grid with random cells, each active with chance `density`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R, density: f64) {
        let density = if density.is_finite() { density.clamp(0.0, 1.0) } else { 0.0 };
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                *cell = rng.gen_bool(density);
            }
        }
    }
}

fn source_column(new_col: usize, old_count: usize, new_count: usize) -> Option<usize> {
    let scaled = new_col * old_count;
    if new_count > old_count && scaled % new_count != 0 {
        return None;
    }
    let src = scaled / new_count;
    (src < old_count).then_some(src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn active_steps(pattern: &Pattern, instrument: Instrument) -> Vec<usize> {
        (0..pattern.step_count())
            .filter(|&s| pattern.get(instrument, s))
            .collect()
    }

    #[test]
    fn toggle_twice_restores_every_cell() {
        let mut pattern = Pattern::new(16);
        pattern.randomize(&mut StdRng::seed_from_u64(5), 0.5);
        let before = pattern.clone();
        for instrument in Instrument::ALL {
            for step in 0..16 {
                let first = pattern.toggle(instrument, step).unwrap();
                assert_eq!(first, !before.get(instrument, step));
                let second = pattern.toggle(instrument, step).unwrap();
                assert_eq!(second, before.get(instrument, step));
            }
        }
        assert_eq!(pattern, before);
    }

    #[test]
    fn toggle_touches_one_cell() {
        let mut pattern = Pattern::new(8);
        assert!(pattern.toggle(Instrument::Snare, 3).unwrap());
        assert_eq!(pattern.active_count(), 1);
        assert_eq!(pattern.active_at(3), vec![Instrument::Snare]);
    }

    #[test]
    fn toggle_out_of_range_is_an_error() {
        let mut pattern = Pattern::new(8);
        assert_eq!(
            pattern.toggle(Instrument::Kick, 8),
            Err(MachineError::StepOutOfRange { step: 8, step_count: 8 })
        );
        assert_eq!(pattern.active_count(), 0);
    }

    #[test]
    fn active_at_keeps_track_order() {
        let mut pattern = Pattern::new(4);
        pattern.set(Instrument::Ride, 0, true).unwrap();
        pattern.set(Instrument::Kick, 0, true).unwrap();
        pattern.set(Instrument::ClosedHihat, 0, true).unwrap();
        assert_eq!(
            pattern.active_at(0),
            vec![Instrument::Kick, Instrument::ClosedHihat, Instrument::Ride]
        );
        assert!(pattern.active_at(1).is_empty());
    }

    #[test]
    fn even_columns_survive_shrink_and_grow() {
        let range = StepRange::default();
        let mut pattern = Pattern::new(16);
        for step in (0..16).step_by(2) {
            pattern.set(Instrument::Kick, step, true).unwrap();
        }
        pattern.resize(8, &range).unwrap();
        assert_eq!(active_steps(&pattern, Instrument::Kick), (0..8).collect::<Vec<_>>());
        assert!(pattern.rows.iter().all(|row| row.len() == 8));

        pattern.resize(16, &range).unwrap();
        assert_eq!(
            active_steps(&pattern, Instrument::Kick),
            (0..16).step_by(2).collect::<Vec<_>>()
        );
        assert_eq!(pattern.active_count(), 8);
    }

    #[test]
    fn shrink_uses_floor_mapping() {
        let range = StepRange::default();
        let mut pattern = Pattern::new(12);
        // new columns read old 0, 1, 3, 4, 6, 7, 9, 10
        pattern.set(Instrument::Clap, 4, true).unwrap();
        pattern.set(Instrument::Clap, 6, true).unwrap();
        pattern.set(Instrument::Clap, 11, true).unwrap();
        pattern.resize(8, &range).unwrap();
        assert_eq!(active_steps(&pattern, Instrument::Clap), vec![3, 4]);
    }

    #[test]
    fn off_grid_step_count_is_rejected_unchanged() {
        let range = StepRange::default();
        let mut pattern = Pattern::new(16);
        pattern.set(Instrument::Crash, 0, true).unwrap();
        let before = pattern.clone();
        for bad in [3, 0, 18, 36] {
            assert!(matches!(
                pattern.resize(bad, &range),
                Err(MachineError::InvalidStepCount { requested, .. }) if requested == bad
            ));
            assert_eq!(pattern, before);
        }
    }

    #[test]
    fn reverse_mirrors_rows() {
        let mut pattern = Pattern::new(8);
        pattern.set(Instrument::Kick, 0, true).unwrap();
        pattern.set(Instrument::Snare, 5, true).unwrap();
        pattern.reverse();
        assert_eq!(active_steps(&pattern, Instrument::Kick), vec![7]);
        assert_eq!(active_steps(&pattern, Instrument::Snare), vec![2]);
    }

    #[test]
    fn clear_and_randomize() {
        let mut pattern = Pattern::new(32);
        pattern.randomize(&mut StdRng::seed_from_u64(9), 0.2);
        let density = pattern.active_count() as f64 / (32 * TRACK_COUNT) as f64;
        assert!((0.1..0.3).contains(&density), "{density}");

        let mut again = Pattern::new(32);
        again.randomize(&mut StdRng::seed_from_u64(9), 0.2);
        assert_eq!(pattern, again);

        pattern.clear();
        assert_eq!(pattern.active_count(), 0);
        pattern.randomize(&mut StdRng::seed_from_u64(1), 1.0);
        assert_eq!(pattern.active_count(), 32 * TRACK_COUNT);
    }
}
