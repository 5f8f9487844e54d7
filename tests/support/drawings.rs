use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

const INK: Rgba<u8> = Rgba([20, 20, 20, 255]);

/// A 100x100 PNG of the stroke pattern for `class`, nudged right/down by `shift` pixels.
///
/// Class 1 is a vertical bar, class 2 a horizontal bar, class 3 a diagonal cross.
pub fn drawing(class: u8, shift: u32) -> Vec<u8> {
    encode(pattern(class, 100, 100, shift))
}

/// The stroke pattern for `class` on a canvas of any size.
pub fn drawing_sized(class: u8, width: u32, height: u32) -> Vec<u8> {
    encode(pattern(class, width, height, 0))
}

/// A fully transparent canvas, which normalizes like blank paper.
pub fn blank(width: u32, height: u32) -> Vec<u8> {
    encode(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])))
}

fn pattern(class: u8, width: u32, height: u32, shift: u32) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let thick_x = (width / 5).max(1);
    let thick_y = (height / 5).max(1);
    for y in 0..height {
        for x in 0..width {
            let inked = match class {
                1 => {
                    let start = width / 2 - thick_x / 2 + shift;
                    x >= start && x < start + thick_x
                }
                2 => {
                    let start = height / 2 - thick_y / 2 + shift;
                    y >= start && y < start + thick_y
                }
                _ => {
                    let fx = x as f32 / width as f32;
                    let fy = y as f32 / height as f32;
                    (fx - fy).abs() < 0.1 || (fx + fy - 1.0).abs() < 0.1
                }
            };
            if inked {
                image.put_pixel(x, y, INK);
            }
        }
    }
    image
}

fn encode(image: RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}
