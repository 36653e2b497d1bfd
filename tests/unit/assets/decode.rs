use std::io::Cursor;

use super::*;

fn encode_png(width: u32, height: u32, rgba: Vec<u8>) -> Vec<u8> {
    let img = image::RgbaImage::from_raw(width, height, rgba).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn decode_trait_png_dimensions_and_premul() {
    let buf = encode_png(1, 1, vec![100u8, 50u8, 200u8, 128u8]);

    let payload = decode_trait_image(&buf).unwrap();
    assert_eq!(payload.width, 1);
    assert_eq!(payload.height, 1);
    assert_eq!(
        payload.rgba8_premul.as_slice(),
        &[
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            ((200u16 * 128 + 127) / 255) as u8,
            128u8
        ]
    );
    assert_eq!(payload.size_bytes(), 4);
}

#[test]
fn fully_transparent_pixels_are_zeroed() {
    let buf = encode_png(2, 1, vec![255, 255, 255, 0, 10, 20, 30, 255]);
    let payload = decode_trait_image(&buf).unwrap();
    assert_eq!(payload.rgba8_premul.as_slice(), &[0, 0, 0, 0, 10, 20, 30, 255]);
}

#[test]
fn garbage_bytes_fail_to_decode() {
    assert!(decode_trait_image(b"not an image").is_err());
}

#[test]
fn raw_payload_length_is_checked() {
    assert!(TraitPayload::from_rgba8_premul(2, 2, vec![0; 16]).is_ok());
    assert!(TraitPayload::from_rgba8_premul(2, 2, vec![0; 15]).is_err());
}

#[test]
fn clones_share_pixels() {
    let a = TraitPayload::from_rgba8_premul(1, 1, vec![1, 2, 3, 4]).unwrap();
    let b = a.clone();
    let c = TraitPayload::from_rgba8_premul(1, 1, vec![1, 2, 3, 4]).unwrap();
    assert!(a.shares_pixels(&b));
    assert!(!a.shares_pixels(&c));
    assert_eq!(a, c);
}
