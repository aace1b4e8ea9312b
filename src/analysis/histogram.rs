use std::io::Write;

use anyhow::Result;

/// Renders a histogram of cluster ids, one bin per cluster.
pub trait HistogramSink {
    fn render(&mut self, assignments: &[usize], bins: usize) -> Result<()>;
}

/// Horizontal bar chart written to a terminal (or any writer).
pub struct TerminalHistogram<W: Write> {
    out: W,
    width: usize,
}

impl TerminalHistogram<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout(), 50)
    }
}

impl<W: Write> TerminalHistogram<W> {
    pub fn new(out: W, width: usize) -> Self {
        Self { out, width }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> HistogramSink for TerminalHistogram<W> {
    fn render(&mut self, assignments: &[usize], bins: usize) -> Result<()> {
        let counts = bin_counts(assignments, bins);
        let max = counts.iter().copied().max().unwrap_or(0);

        writeln!(self.out, "\nDistribution of Fiverr Gigs in Clusters")?;
        writeln!(self.out, "{}", "-".repeat(self.width + 20))?;
        for (i, &n) in counts.iter().enumerate() {
            let len = if max == 0 { 0 } else { n * self.width / max };
            writeln!(self.out, "Cluster {:>3} | {:<w$} {}", i + 1, "#".repeat(len), n, w = self.width)?;
        }
        writeln!(self.out, "{:>11} {}", "", "Number of Gigs")?;
        self.out.flush()?;
        Ok(())
    }
}

pub fn bin_counts(assignments: &[usize], bins: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bins];
    for &a in assignments {
        if let Some(c) = counts.get_mut(a) {
            *c += 1;
        }
    }
    counts
}
