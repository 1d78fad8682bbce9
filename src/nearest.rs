use crate::pal::{diff, Color, PalIndex};

/// Exhaustive nearest-color search. Ties resolve to the lowest index.
pub(crate) struct Nearest<'pal> {
    palette: &'pal [Color],
}

impl<'pal> Nearest<'pal> {
    #[inline]
    pub fn new(palette: &'pal [Color]) -> Self {
        debug_assert!(!palette.is_empty());
        debug_assert!(palette.len() <= PalIndex::MAX as usize + 1);
        Self { palette }
    }

    /// Index of the closest palette entry and its squared distance
    #[inline]
    pub fn search(&self, px: Color) -> (PalIndex, u32) {
        let mut best = (0, u32::MAX);
        for (idx, &pal_px) in self.palette.iter().enumerate() {
            let d = diff(px, pal_px);
            if d < best.1 {
                best = (idx as PalIndex, d);
                if d == 0 {
                    break;
                }
            }
        }
        best
    }

    #[inline]
    pub fn color(&self, idx: PalIndex) -> Color {
        self.palette[idx as usize]
    }
}

#[test]
fn first_minimum_wins() {
    let pal = [Color::new(10, 10, 10), Color::new(0, 0, 0), Color::new(20, 20, 20), Color::new(0, 0, 0)];
    let n = Nearest::new(&pal);
    // equidistant from entries 0 and 2
    assert_eq!((0, 75), n.search(Color::new(15, 15, 15)));
    assert_eq!(1, n.search(Color::new(0, 0, 0)).0);
    assert_eq!(1, n.search(Color::new(1, 0, 0)).0);
    assert_eq!(2, n.search(Color::new(255, 255, 255)).0);
    assert_eq!(Color::new(20, 20, 20), n.color(2));
}
