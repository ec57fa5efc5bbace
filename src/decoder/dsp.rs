// src/decoder/dsp.rs

/// Remap interleaved frames from `in_ch` to `out_ch` channels.
pub fn updown_mix_interleaved(input: &[f32], in_ch: usize, out_ch: usize) -> Vec<f32> {
    if in_ch == out_ch || in_ch == 0 || out_ch == 0 {
        return input.to_vec();
    }
    let frames = input.len() / in_ch;
    let mut out = vec![0.0f32; frames * out_ch];

    match (in_ch, out_ch) {
        (1, _) => {
            for f in 0..frames {
                let m = input[f];
                for oc in 0..out_ch {
                    out[f * out_ch + oc] = m;
                }
            }
        }
        (2, 1) => {
            for f in 0..frames {
                let l = input[f * 2];
                let r = input[f * 2 + 1];
                out[f] = 0.5 * (l + r);
            }
        }
        _ if out_ch < in_ch => {
            let factor = in_ch as f32 / out_ch as f32;
            for f in 0..frames {
                for oc in 0..out_ch {
                    let start = (oc as f32 * factor).floor() as usize;
                    let end = (((oc + 1) as f32 * factor).ceil() as usize).min(in_ch);
                    let mut acc = 0.0f32;
                    let mut n = 0usize;
                    for ic in start..end {
                        acc += input[f * in_ch + ic];
                        n += 1;
                    }
                    out[f * out_ch + oc] = if n > 0 { acc / n as f32 } else { 0.0 };
                }
            }
        }
        _ => {
            for f in 0..frames {
                for oc in 0..out_ch {
                    let ic = oc % in_ch;
                    out[f * out_ch + oc] = input[f * in_ch + ic];
                }
            }
        }
    }

    out
}
