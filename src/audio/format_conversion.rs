// Format conversion for output streams
//
// The engine renders planar f32 stereo; devices want interleaved frames in
// their own sample format (F32, I16 or U16). Conversion goes through cpal's
// `FromSample`, without allocation.

use cpal::{FromSample, Sample};

/// Write planar stereo into an interleaved buffer of `channels` channels.
/// Extra channels get silence; a mono device gets (L + R) / 2. Returns the
/// number of frames written.
#[inline]
pub fn write_interleaved<T>(left: &[f32], right: &[f32], output: &mut [T], channels: usize) -> usize
where
    T: Sample + FromSample<f32>,
{
    let channels = channels.max(1);
    let mut written = 0;
    for ((frame, l), r) in output.chunks_exact_mut(channels).zip(left).zip(right) {
        write_frame(*l, *r, frame);
        written += 1;
    }
    written
}

#[inline]
fn write_frame<T>(left: f32, right: f32, frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    match frame {
        [mono] => *mono = T::from_sample((left + right) * 0.5),
        [l, r, rest @ ..] => {
            *l = T::from_sample(left);
            *r = T::from_sample(right);
            for sample in rest {
                *sample = T::EQUILIBRIUM;
            }
        }
        [] => {}
    }
}
