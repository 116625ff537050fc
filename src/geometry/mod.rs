// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sub-image bookkeeping for the minor cycle.
//!
//! Every component found by the minor cycle only changes the model and
//! residual images within a window the size of the PSF support around the
//! component. An [`ImagePatch`] holds that window in image coordinates along
//! with the matching window of the (support-sized) PSF/scale cubes.


use ndarray::{s, Ix2, Ix3, SliceInfo, SliceInfoElem};

/// An inclusive, axis-aligned box of pixels, `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    /// Bottom-left corner.
    pub blc: [usize; 2],
    /// Top-right corner (inclusive).
    pub trc: [usize; 2],
}

impl PixelBox {
    /// A box covering all of an image.
    pub fn full(shape: (usize, usize)) -> PixelBox {
        PixelBox {
            blc: [0, 0],
            trc: [shape.0.saturating_sub(1), shape.1.saturating_sub(1)],
        }
    }

    /// Make a box from (possibly out-of-bounds) signed corners, fixing any
    /// corner that falls outside of `shape`. A bottom-left corner outside the
    /// image moves to 0, a top-right corner outside the image moves to the last
    /// pixel, and a box that ends up inverted covers the whole axis.
    pub fn verified(blc: [isize; 2], trc: [isize; 2], shape: (usize, usize)) -> PixelBox {
        let shape = [shape.0 as isize, shape.1 as isize];
        let mut out_blc = [0; 2];
        let mut out_trc = [0; 2];
        for i in 0..2 {
            let mut b = blc[i];
            let mut t = trc[i];
            if b < 0 || b >= shape[i] {
                b = 0;
            }
            if t < 0 || t >= shape[i] {
                t = shape[i] - 1;
            }
            if t < b {
                b = 0;
                t = shape[i] - 1;
            }
            out_blc[i] = b as usize;
            out_trc[i] = t.max(0) as usize;
        }
        PixelBox {
            blc: out_blc,
            trc: out_trc,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (
            self.trc[0] + 1 - self.blc[0],
            self.trc[1] + 1 - self.blc[1],
        )
    }

    pub fn num_pixels(&self) -> usize {
        let (x, y) = self.shape();
        x * y
    }

    pub fn contains(&self, pos: (usize, usize)) -> bool {
        (self.blc[0]..=self.trc[0]).contains(&pos.0) && (self.blc[1]..=self.trc[1]).contains(&pos.1)
    }

    /// The ndarray slice selecting this box.
    pub fn slice(&self) -> SliceInfo<[SliceInfoElem; 2], Ix2, Ix2> {
        s![self.blc[0]..=self.trc[0], self.blc[1]..=self.trc[1]]
    }

    /// The ndarray slice selecting this box from every image of a stack
    /// indexed `[image, x, y]`.
    pub fn stacked_slice(&self) -> SliceInfo<[SliceInfoElem; 3], Ix3, Ix3> {
        s![.., self.blc[0]..=self.trc[0], self.blc[1]..=self.trc[1]]
    }
}

/// Shrink the larger of two boxes symmetrically, axis by axis, until both
/// boxes have the same shape.
pub fn make_boxes_same_size(a: &mut PixelBox, b: &mut PixelBox) {
    for i in 0..2 {
        let len_a = a.trc[i] - a.blc[i];
        let len_b = b.trc[i] - b.blc[i];
        let (bigger, diff) = match len_a.cmp(&len_b) {
            std::cmp::Ordering::Equal => continue,
            std::cmp::Ordering::Greater => (&mut *a, len_a - len_b),
            std::cmp::Ordering::Less => (&mut *b, len_b - len_a),
        };
        bigger.blc[i] += diff / 2;
        bigger.trc[i] -= diff / 2 + diff % 2;
    }
}

/// The windows of the image and of the PSF support touched by a component at
/// a given pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePatch {
    /// The window into the full-size model and residual images.
    pub model: PixelBox,
    /// The matching window into the support-sized PSF cube and scale patches.
    pub psf: PixelBox,
}

impl ImagePatch {
    /// The patch for a component at `peak`. The PSF peak is at the centre of
    /// the `support`-sized window, `(support/2, support/2)`.
    pub fn around(peak: (usize, usize), support: usize, image_shape: (usize, usize)) -> ImagePatch {
        let half = (support / 2) as isize;
        let peak = [peak.0 as isize, peak.1 as isize];

        let model = PixelBox::verified(
            [peak[0] - half, peak[1] - half],
            [peak[0] + half - 1, peak[1] + half - 1],
            image_shape,
        );
        let offset = [half - peak[0], half - peak[1]];
        let psf = PixelBox::verified(
            [
                model.blc[0] as isize + offset[0],
                model.blc[1] as isize + offset[1],
            ],
            [
                model.trc[0] as isize + offset[0],
                model.trc[1] as isize + offset[1],
            ],
            (support, support),
        );

        let mut patch = ImagePatch { model, psf };
        make_boxes_same_size(&mut patch.model, &mut patch.psf);
        patch
    }

    /// A patch covering a whole image. Only the model box is meaningful.
    pub fn full(image_shape: (usize, usize)) -> ImagePatch {
        ImagePatch {
            model: PixelBox::full(image_shape),
            psf: PixelBox::full(image_shape),
        }
    }
}

/// The side length of the (square) PSF support window. It is large enough to
/// hold `num_beams` main lobes of the PSF broadened by the largest scale,
/// never smaller than `num_beams` beam widths nor larger than the image, and
/// always even.
pub fn psf_support_size(
    psf_beam_width: f32,
    num_beams: f32,
    max_scale_size: f32,
    nx: usize,
    ny: usize,
) -> usize {
    let width = psf_beam_width as f64;
    let scale = max_scale_size as f64;
    let num_beams = num_beams as f64;

    let mut support = ((width * width + scale * scale).sqrt() * num_beams).round();
    support = support.max((width * num_beams).round());
    let mut support = (support as usize).min(nx.min(ny));
    if support % 2 != 0 {
        support -= 1;
    }
    support
}
