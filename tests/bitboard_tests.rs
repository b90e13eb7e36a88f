use broadside::{BitBoard, BitBoardError, Coord};

#[test]
fn test_try_new_sizes() {
    let ok = BitBoard::<u64, 8>::try_new();
    assert!(ok.is_ok());

    let err = BitBoard::<u8, 3>::try_new();
    assert!(matches!(err, Err(BitBoardError::SizeTooLarge { .. })));
}

#[test]
fn test_get_set() {
    let mut bb = BitBoard::<u16, 4>::new();
    assert!(bb.is_empty());

    bb.set(Coord::new(1, 1)).unwrap();
    assert!(bb.get(Coord::new(1, 1)));
    assert!(!bb.get(Coord::new(2, 1)));
    assert_eq!(bb.count_ones(), 1);

    // Off-board reads are unset, writes are errors.
    assert!(!bb.get(Coord::new(4, 0)));
    assert_eq!(
        bb.set(Coord::new(4, 0)),
        Err(BitBoardError::IndexOutOfBounds { x: 4, y: 0 })
    );
}

#[test]
fn test_cells_row_major() {
    let mut bb = BitBoard::<u128, 10>::new();
    bb.set(Coord::new(9, 9)).unwrap();
    bb.set(Coord::new(3, 0)).unwrap();
    bb.set(Coord::new(0, 2)).unwrap();
    let cells: Vec<_> = bb.cells().collect();
    assert_eq!(
        cells,
        vec![Coord::new(3, 0), Coord::new(0, 2), Coord::new(9, 9)]
    );
}

#[test]
fn test_bit_ops() {
    let mut a = BitBoard::<u16, 4>::new();
    let mut b = BitBoard::<u16, 4>::new();
    a.set(Coord::new(0, 0)).unwrap();
    a.set(Coord::new(1, 0)).unwrap();
    b.set(Coord::new(1, 0)).unwrap();
    b.set(Coord::new(2, 0)).unwrap();

    assert_eq!((a | b).count_ones(), 3);
    assert_eq!((a & b).count_ones(), 1);
    assert_eq!((!a).count_ones(), 14);
    assert!((!a & a).is_empty());
}
