//! Structural checks over a finished layout.
//!
//! The engine's invariants tie addresses, sizes, and control flow together
//! tightly enough that a single off-by-one loses the program, so wary
//! clients (and the test suite) can re-check the geometry of a finished
//! run: no two placed regions overlap, every byte of recovered slack is
//! covered exactly once by relocated code or padding, and nothing lands
//! outside slack or the fresh region.

use crate::driver::RewriteOutcome;
use reflow_core::{ConcreteAddr, Error, IsaProvider, Result};

#[derive(Debug, Clone, Copy)]
struct Region {
    start: ConcreteAddr,
    end: ConcreteAddr,
}

impl Region {
    fn len(&self) -> Result<u64> {
        Ok(self.end.distance_from(self.start)? as u64)
    }

    fn contains(&self, other: &Region) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

/// Checks a finished run for overlapping placements and slack coverage.
///
/// `start_addr` is the fresh-region base the run was given; the outcome
/// carries its end and the recovered slack regions.
pub fn validate_outcome<P: IsaProvider>(
    isa: &P,
    start_addr: ConcreteAddr,
    outcome: &RewriteOutcome<P::Insn, P::Tagged>,
) -> Result<()> {
    let layout = &outcome.layout;

    // Gather every region the layout writes outside the original blocks.
    let mut placed: Vec<Region> = Vec::new();
    for pair in layout.program_blocks.iter().filter(|p| p.status.is_modified()) {
        let start = pair.rewritten.assigned;
        placed.push(Region {
            start,
            end: start.advance(pair.rewritten.block.byte_size(isa))?,
        });
    }
    for padding in &layout.padding_blocks {
        placed.push(Region {
            start: padding.address(),
            end: padding.end(isa)?,
        });
    }
    for blob in &layout.injected_blocks {
        placed.push(Region {
            start: blob.address,
            end: blob.address.advance(blob.bytes.len() as u64)?,
        });
    }

    placed.sort_by_key(|r| (r.start, r.end));
    for pair in placed.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(Error::OverlappingAssignments {
                first: pair[0].start,
                second: pair[1].start,
            });
        }
    }

    let slack: Vec<Region> = outcome
        .slack_regions
        .iter()
        .map(|c| {
            Ok(Region {
                start: c.addr,
                end: c.addr.advance(c.size)?,
            })
        })
        .collect::<Result<_>>()?;

    // Each slack region must be covered exactly; the placements are known
    // disjoint, so summing contained lengths suffices.
    for region in &slack {
        let mut covered = 0u64;
        for r in placed.iter().filter(|r| region.contains(r)) {
            covered += r.len()?;
        }
        let expected = region.len()?;
        if covered != expected {
            return Err(Error::SlackNotCovered {
                addr: region.start,
                covered,
                expected,
            });
        }
    }

    // Nothing may land outside slack or the fresh region.
    let fresh = Region {
        start: start_addr,
        end: outcome.fresh_region_end,
    };
    for r in &placed {
        if !fresh.contains(r) && !slack.iter().any(|s| s.contains(r)) {
            return Err(Error::OverlappingAssignments {
                first: r.start,
                second: r.start,
            });
        }
    }

    Ok(())
}
