use crate::settings::ColorSpace;

// sRGB (D65) to XYZ
const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412_453, 0.357_580, 0.180_423],
    [0.212_671, 0.715_160, 0.072_169],
    [0.019_334, 0.119_193, 0.950_227],
];

const WHITE: [f32; 3] = [0.950_456, 1.0, 1.088_754];
const EPSILON: f32 = 0.008_856;
const KAPPA: f32 = 903.3;

/// Converts an 8-bit RGB triple into clustering coordinates.
///
/// RGB and XYZ come out on a 0..255 scale, CIELAB as L in 0..100 with signed a/b.
pub fn convert(rgb: [u8; 3], space: ColorSpace) -> [f32; 3] {
    let rgb = [rgb[0] as f32, rgb[1] as f32, rgb[2] as f32];
    match space {
        ColorSpace::Rgb => rgb,
        ColorSpace::Xyz => {
            let xyz = rgb_to_xyz(rgb);
            [xyz[0] * 255.0, xyz[1] * 255.0, xyz[2] * 255.0]
        }
        ColorSpace::CieLab => xyz_to_lab(rgb_to_xyz(rgb)),
    }
}

/// Normalizing range of a color distance in `space`.
pub const fn range(space: ColorSpace) -> f32 {
    match space {
        ColorSpace::Rgb | ColorSpace::Xyz => 255.0,
        ColorSpace::CieLab => 100.0,
    }
}

fn rgb_to_xyz(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(|c| c / 255.0);
    RGB_TO_XYZ.map(|row| row[0] * r + row[1] * g + row[2] * b)
}

fn xyz_to_lab(xyz: [f32; 3]) -> [f32; 3] {
    let f = |t: f32| {
        if t > EPSILON {
            t.cbrt()
        } else {
            (KAPPA * t + 16.0) / 116.0
        }
    };
    let fx = f(xyz[0] / WHITE[0]);
    let fy = f(xyz[1] / WHITE[1]);
    let fz = f(xyz[2] / WHITE[2]);

    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}
