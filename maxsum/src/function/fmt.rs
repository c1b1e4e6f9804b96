use std::fmt;

use super::DiscreteFunction;
use crate::domain::ind2sub;

/// Prints values as 2-D grids: the first variable indexes rows, the second
/// columns, and each joint value of the remaining variables gets its own grid.
impl fmt::Display for DiscreteFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.num_vars() == 0 {
            return writeln!(f, "{}", self.values[0]);
        }
        let sizes = self.sizes();
        let rows = sizes[0];
        let cols = sizes.get(1).copied().unwrap_or(1);
        let outer = &sizes[sizes.len().min(2)..];
        let n_slices: usize = outer.iter().product();
        writeln!(f, "DiscreteFunction over {:?} (sizes {:?})", self.vars(), sizes)?;
        for slice in 0..n_slices {
            if !outer.is_empty() {
                let sub = ind2sub(slice, outer).map_err(|_| fmt::Error)?;
                let sub = sub.iter().map(|s| s.to_string()).collect::<Vec<_>>();
                writeln!(f, "(:,:,{}) =", sub.join(","))?;
            }
            for r in 0..rows {
                for c in 0..cols {
                    write!(f, " {:>10.4}", self.values[r + rows * (c + cols * slice)])?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
