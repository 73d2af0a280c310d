use ndarray::{s, Array3};
use tempfile::tempdir;
use vocal_remover_core::io::mask_image::{render_mask, write_mask_png};

#[test]
fn image_is_frames_wide_and_bins_tall() {
    let img = render_mask(&Array3::ones((2, 4, 6))).unwrap();
    assert_eq!(img.dimensions(), (6, 4));
    // mask 1 means no vocal: darkest colour
    assert!(img.pixels().all(|p| p.0 == [0, 0, 4]));
}

#[test]
fn low_bins_are_drawn_at_the_bottom() {
    let mut mask = Array3::<f32>::ones((1, 3, 5));
    mask.slice_mut(s![0, 0, ..]).fill(0.0);

    let img = render_mask(&mask).unwrap();
    assert_eq!(img.get_pixel(2, 2).0, [252, 253, 191]);
    assert_eq!(img.get_pixel(2, 0).0, [0, 0, 4]);
}

#[test]
fn channels_are_averaged() {
    let mut mask = Array3::<f32>::ones((2, 1, 1));
    mask[[1, 0, 0]] = 0.0;
    let img = render_mask(&mask).unwrap();
    let half = img.get_pixel(0, 0).0;
    assert_ne!(half, [0, 0, 4]);
    assert_ne!(half, [252, 253, 191]);
}

#[test]
fn writes_png() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mask.png");
    write_mask_png(&path, &Array3::from_elem((2, 8, 8), 0.5)).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], b"\x89PNG");
}
