//! Breadth-first propagation and retraction of steady-state fields.

use std::collections::VecDeque;

use kiln_core::{FieldSource, SubstanceGrid, SubstanceKind};

use crate::field::{Field, EPSILON};

const ORTHOGONAL: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

/// Propagates the sources outward, keeping the maximum of competing sources.
pub(crate) fn fill(field: &Field, grid: &mut SubstanceGrid, sources: &[FieldSource]) {
    let size = grid.size();
    let mut frontier: VecDeque<(usize, SubstanceKind)> = VecDeque::new();

    for source in sources {
        let rule = source.kind.rule();
        if rule.dispersing {
            tracing::trace!(kind = ?source.kind, "flood fill ignores dispersing substance");
            continue;
        }
        let Some(index) = size.index(source.cell) else {
            continue;
        };
        let quantity = source.quantity.min(rule.capacity);
        if quantity > grid.at(index, source.kind) {
            grid.set_at(index, source.kind, quantity);
        }
        frontier.push_back((index, source.kind));
    }

    while let Some((index, kind)) = frontier.pop_front() {
        let next = grid.at(index, kind) - kind.rule().decay_amount;
        if next <= EPSILON {
            continue;
        }
        let Some(cell) = size.cell_at(index) else {
            continue;
        };
        for (dx, dy) in ORTHOGONAL {
            let Some(neighbor) = cell.offset(dx, dy).and_then(|cell| size.index(cell)) else {
                continue;
            };
            if !field.capability_admits(neighbor, kind) {
                continue;
            }
            if grid.at(neighbor, kind) + EPSILON < next {
                grid.set_at(neighbor, kind, next);
                frontier.push_back((neighbor, kind));
            }
        }
    }
}

/// Clears the region derived from each removed source.
///
/// The region is every cell reachable through strictly decreasing values.
/// Returns the cells bordering the cleared region that still hold a value,
/// which the caller refloods from.
pub(crate) fn retract(
    field: &Field,
    grid: &mut SubstanceGrid,
    sources: &[FieldSource],
) -> Vec<FieldSource> {
    let size = grid.size();
    let mut boundary = Vec::new();
    let mut frontier: VecDeque<(usize, f64)> = VecDeque::new();

    for source in sources {
        let kind = source.kind;
        let Some(start) = size.index(source.cell) else {
            continue;
        };
        frontier.push_back((start, grid.at(start, kind)));
        grid.set_at(start, kind, 0.0);

        while let Some((index, value)) = frontier.pop_front() {
            let Some(cell) = size.cell_at(index) else {
                continue;
            };
            for (dx, dy) in ORTHOGONAL {
                let Some(neighbor) = cell.offset(dx, dy).and_then(|cell| size.index(cell)) else {
                    continue;
                };
                if !field.capability_admits(neighbor, kind) {
                    continue;
                }
                let held = grid.at(neighbor, kind);
                if held <= EPSILON {
                    continue;
                }
                if held + EPSILON < value {
                    grid.set_at(neighbor, kind, 0.0);
                    frontier.push_back((neighbor, held));
                } else {
                    boundary.push((neighbor, kind));
                }
            }
        }
    }

    boundary
        .into_iter()
        .filter_map(|(index, kind)| {
            let quantity = grid.at(index, kind);
            if quantity <= EPSILON {
                return None;
            }
            Some(FieldSource {
                cell: size.cell_at(index)?,
                kind,
                quantity,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{
        Capability, CapabilitySet, CellCoord, CellRect, CellRectSize, BlockerSeed, EntityId,
        FieldCommand, GridSize,
    };

    fn light(cell: CellCoord) -> FieldSource {
        FieldSource {
            cell,
            kind: SubstanceKind::Light,
            quantity: 350.0,
        }
    }

    #[test]
    fn fill_falls_off_by_decay_amount_per_step() {
        let mut field = Field::new(GridSize::new(5, 1));
        field.apply(FieldCommand::FloodFill {
            sources: vec![light(CellCoord::new(0, 0))],
        });

        let grid = field.grid();
        assert_eq!(grid.get(CellCoord::new(0, 0), SubstanceKind::Light), 350.0);
        assert_eq!(grid.get(CellCoord::new(4, 0), SubstanceKind::Light), 346.0);
    }

    #[test]
    fn fill_keeps_the_stronger_source() {
        let mut field = Field::new(GridSize::new(5, 1));
        field.apply(FieldCommand::FloodFill {
            sources: vec![
                light(CellCoord::new(0, 0)),
                FieldSource {
                    cell: CellCoord::new(4, 0),
                    kind: SubstanceKind::Light,
                    quantity: 100.0,
                },
            ],
        });
        assert_eq!(
            field.grid().get(CellCoord::new(4, 0), SubstanceKind::Light),
            346.0
        );
    }

    #[test]
    fn fill_stops_at_blockers() {
        let mut field = Field::new(GridSize::new(3, 1));
        field.apply(FieldCommand::TrackBlocker(BlockerSeed {
            entity: EntityId::new(1),
            footprint: CellRect::from_origin_and_size(CellCoord::new(1, 0), CellRectSize::new(1, 1)),
            capabilities: CapabilitySet::of(&[Capability::Terrain]),
        }));
        field.apply(FieldCommand::FloodFill {
            sources: vec![light(CellCoord::new(0, 0))],
        });
        assert_eq!(field.grid().get(CellCoord::new(2, 0), SubstanceKind::Light), 0.0);
    }

    #[test]
    fn retraction_clears_derived_cells_and_refloods_from_remaining_emitters() {
        let size = GridSize::new(6, 1);
        let mut field = Field::new(size);
        field.apply(FieldCommand::Init {
            columns: 6,
            rows: 1,
            quantities: SubstanceGrid::new(size),
            blockers: Vec::new(),
            emitters: vec![kiln_core::EmitterSeed {
                entity: EntityId::new(2),
                cell: CellCoord::new(5, 0),
                kind: SubstanceKind::Light,
                quantity: 200.0,
            }],
            turbines: Vec::new(),
        });
        field.apply(FieldCommand::FloodFill {
            sources: vec![
                light(CellCoord::new(0, 0)),
                FieldSource {
                    cell: CellCoord::new(5, 0),
                    kind: SubstanceKind::Light,
                    quantity: 200.0,
                },
            ],
        });
        assert_eq!(field.grid().get(CellCoord::new(5, 0), SubstanceKind::Light), 345.0);

        field.apply(FieldCommand::ReverseFloodFill {
            sources: vec![light(CellCoord::new(0, 0))],
        });
        let grid = field.grid();
        assert_eq!(grid.get(CellCoord::new(5, 0), SubstanceKind::Light), 200.0);
        assert_eq!(grid.get(CellCoord::new(0, 0), SubstanceKind::Light), 195.0);
    }

    #[test]
    fn retraction_without_survivors_empties_the_region() {
        let mut field = Field::new(GridSize::new(4, 1));
        field.apply(FieldCommand::FloodFill {
            sources: vec![light(CellCoord::new(0, 0))],
        });
        field.apply(FieldCommand::ReverseFloodFill {
            sources: vec![light(CellCoord::new(0, 0))],
        });
        let grid = field.grid();
        for column in 0..4 {
            assert_eq!(grid.get(CellCoord::new(column, 0), SubstanceKind::Light), 0.0);
        }
    }
}
