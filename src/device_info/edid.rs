//! Minimal EDID 1.x decoder: identity, detailed timings, physical size and
//! the CTA-861 HDR capability blocks.

use anyhow::{anyhow, bail, Result};
use tracing::debug;

use super::screen::HdrType;

const BLOCK_LEN: usize = 128;
const DTD_LEN: usize = 18;
const HEADER: [u8; 8] = [0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];
const CTA_EXTENSION_TAG: u8 = 0x02;

const DOLBY_OUI: [u8; 3] = [0x46, 0xd0, 0x00];
const HDR10_PLUS_OUI: [u8; 3] = [0x8b, 0x84, 0x90];

#[derive(Debug, Clone, PartialEq)]
pub struct DetailedTiming {
    pub width: u32,
    pub height: u32,
    pub refresh_hz: f64,
    pub width_mm: u32,
    pub height_mm: u32,
    pub interlaced: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Edid {
    /// Three-letter PNP manufacturer id.
    pub manufacturer: String,
    pub product_code: u16,
    pub monitor_name: Option<String>,
    /// Screen size from the base block, in centimetres.
    pub size_cm: Option<(u32, u32)>,
    /// Detailed timings in declaration order; the first is the preferred mode.
    pub timings: Vec<DetailedTiming>,
    pub hdr_types: Vec<HdrType>,
}

impl Edid {
    pub fn preferred_timing(&self) -> Option<&DetailedTiming> {
        self.timings.first()
    }

    /// Physical size in millimetres, preferring the detailed timing's figure.
    pub fn physical_size_mm(&self) -> Option<(f64, f64)> {
        self.preferred_timing()
            .filter(|t| t.width_mm > 0 && t.height_mm > 0)
            .map(|t| (t.width_mm as f64, t.height_mm as f64))
            .or_else(|| {
                self.size_cm
                    .map(|(w, h)| (w as f64 * 10.0, h as f64 * 10.0))
            })
    }
}

pub fn parse_edid(bytes: &[u8]) -> Result<Edid> {
    let base = bytes
        .get(..BLOCK_LEN)
        .ok_or_else(|| anyhow!("EDID too short: {} bytes", bytes.len()))?;
    if base[..8] != HEADER {
        bail!("Missing EDID header");
    }
    if base.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) != 0 {
        debug!("EDID base block checksum mismatch");
    }

    let id = u16::from_be_bytes([base[8], base[9]]);
    let manufacturer = [10u16, 5, 0]
        .iter()
        .map(|&shift| (b'@' + ((id >> shift) & 0x1f) as u8) as char)
        .collect();

    let mut edid = Edid {
        manufacturer,
        product_code: u16::from_le_bytes([base[10], base[11]]),
        size_cm: (base[21] > 0 && base[22] > 0).then(|| (base[21] as u32, base[22] as u32)),
        ..Edid::default()
    };

    for descriptor in base[54..126].chunks_exact(DTD_LEN) {
        match parse_detailed_timing(descriptor) {
            Some(timing) => edid.timings.push(timing),
            None if descriptor[3] == 0xfc => {
                edid.monitor_name = Some(descriptor_text(&descriptor[5..]));
            }
            None => {}
        }
    }

    let extensions = base[126] as usize;
    for block in bytes[BLOCK_LEN..]
        .chunks_exact(BLOCK_LEN)
        .take(extensions)
        .filter(|block| block[0] == CTA_EXTENSION_TAG)
    {
        parse_cta_block(block, &mut edid);
    }

    edid.hdr_types.sort();
    edid.hdr_types.dedup();
    Ok(edid)
}

fn parse_detailed_timing(d: &[u8]) -> Option<DetailedTiming> {
    let pixel_clock = u16::from_le_bytes([d[0], d[1]]) as f64 * 10_000.0;
    if pixel_clock == 0.0 {
        return None;
    }

    let width = d[2] as u32 | ((d[4] as u32 & 0xf0) << 4);
    let h_blank = d[3] as u32 | ((d[4] as u32 & 0x0f) << 8);
    let height = d[5] as u32 | ((d[7] as u32 & 0xf0) << 4);
    let v_blank = d[6] as u32 | ((d[7] as u32 & 0x0f) << 8);
    let total = (width + h_blank) as f64 * (height + v_blank) as f64;
    if total == 0.0 {
        return None;
    }

    Some(DetailedTiming {
        width,
        height,
        refresh_hz: pixel_clock / total,
        width_mm: d[12] as u32 | ((d[14] as u32 & 0xf0) << 4),
        height_mm: d[13] as u32 | ((d[14] as u32 & 0x0f) << 8),
        interlaced: d[17] & 0x80 != 0,
    })
}

fn descriptor_text(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0x0a).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim().to_string()
}

fn parse_cta_block(block: &[u8], edid: &mut Edid) {
    let dtd_offset = (block[2] as usize).min(BLOCK_LEN - 1);

    if dtd_offset > 4 {
        let mut pos = 4;
        while pos < dtd_offset {
            let header = block[pos];
            let tag = header >> 5;
            let len = (header & 0x1f) as usize;
            let Some(payload) = block.get(pos + 1..pos + 1 + len) else {
                break;
            };
            if tag == 7 {
                parse_extended_data_block(payload, &mut edid.hdr_types);
            }
            pos += 1 + len;
        }
    }

    if dtd_offset >= 4 {
        edid.timings.extend(
            block[dtd_offset..BLOCK_LEN - 1]
                .chunks_exact(DTD_LEN)
                .map_while(parse_detailed_timing),
        );
    }
}

fn parse_extended_data_block(payload: &[u8], hdr_types: &mut Vec<HdrType>) {
    match payload {
        // HDR static metadata: EOTF bit 2 is SMPTE ST 2084, bit 3 is HLG.
        [0x06, eotf, ..] => {
            if eotf & 0x04 != 0 {
                hdr_types.push(HdrType::Hdr10);
            }
            if eotf & 0x08 != 0 {
                hdr_types.push(HdrType::Hlg);
            }
        }
        // Vendor-specific video data block, keyed by IEEE OUI.
        [0x01, a, b, c, ..] => match [*a, *b, *c] {
            DOLBY_OUI => hdr_types.push(HdrType::DolbyVision),
            HDR10_PLUS_OUI => hdr_types.push(HdrType::Hdr10Plus),
            _ => {}
        },
        _ => {}
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn dtd(
        width: u32,
        height: u32,
        h_blank: u32,
        v_blank: u32,
        clock_10khz: u16,
        size_mm: (u32, u32),
    ) -> [u8; DTD_LEN] {
        let mut d = [0u8; DTD_LEN];
        d[..2].copy_from_slice(&clock_10khz.to_le_bytes());
        d[2] = (width & 0xff) as u8;
        d[3] = (h_blank & 0xff) as u8;
        d[4] = (((width >> 8) << 4) | (h_blank >> 8)) as u8;
        d[5] = (height & 0xff) as u8;
        d[6] = (v_blank & 0xff) as u8;
        d[7] = (((height >> 8) << 4) | (v_blank >> 8)) as u8;
        d[12] = (size_mm.0 & 0xff) as u8;
        d[13] = (size_mm.1 & 0xff) as u8;
        d[14] = (((size_mm.0 >> 8) << 4) | (size_mm.1 >> 8)) as u8;
        d
    }

    /// A 1920x1080@60 panel measuring 344x194 mm, optionally with a CTA
    /// extension advertising Dolby Vision, HDR10 and HLG.
    pub(crate) fn sample_edid(with_hdr: bool) -> Vec<u8> {
        let mut base = vec![0u8; BLOCK_LEN];
        base[..8].copy_from_slice(&HEADER);
        // "DEL"
        base[8..10].copy_from_slice(&0x10acu16.to_be_bytes());
        base[10..12].copy_from_slice(&0x1234u16.to_le_bytes());
        base[21] = 34;
        base[22] = 19;
        base[54..72].copy_from_slice(&dtd(1920, 1080, 280, 45, 14850, (344, 194)));
        base[72..90].copy_from_slice(&dtd(1280, 720, 370, 30, 7425, (344, 194)));
        base[93] = 0xfc;
        base[95..108].copy_from_slice(b"Test Panel\n  ");
        base[126] = u8::from(with_hdr);
        let sum = base.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        base[127] = 0u8.wrapping_sub(sum);

        if with_hdr {
            let mut ext = vec![0u8; BLOCK_LEN];
            ext[0] = CTA_EXTENSION_TAG;
            ext[1] = 3;
            let blocks: &[u8] = &[
                0xe3, 0x06, 0x0d, 0x01, // HDR static metadata
                0xe5, 0x01, 0x46, 0xd0, 0x00, 0x00, // Dolby Vision VSVDB
            ];
            ext[4..4 + blocks.len()].copy_from_slice(blocks);
            ext[2] = (4 + blocks.len()) as u8;
            base.extend(ext);
        }
        base
    }

    #[test]
    fn test_parse_identity_and_timings() -> Result<()> {
        let edid = parse_edid(&sample_edid(false))?;
        assert_eq!(edid.manufacturer, "DEL");
        assert_eq!(edid.product_code, 0x1234);
        assert_eq!(edid.monitor_name.as_deref(), Some("Test Panel"));
        assert_eq!(edid.timings.len(), 2);

        let preferred = edid.preferred_timing().unwrap();
        assert_eq!((preferred.width, preferred.height), (1920, 1080));
        assert!((preferred.refresh_hz - 60.0).abs() < 0.01);
        assert_eq!(edid.physical_size_mm(), Some((344.0, 194.0)));
        assert!(!preferred.interlaced);
        assert!(edid.hdr_types.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_cta_hdr_blocks() -> Result<()> {
        let edid = parse_edid(&sample_edid(true))?;
        assert_eq!(
            edid.hdr_types,
            vec![HdrType::DolbyVision, HdrType::Hdr10, HdrType::Hlg]
        );
        Ok(())
    }

    #[test]
    fn test_size_falls_back_to_centimetres() -> Result<()> {
        let mut raw = sample_edid(false);
        raw[54..72].copy_from_slice(&dtd(1920, 1080, 280, 45, 14850, (0, 0)));
        let edid = parse_edid(&raw)?;
        assert_eq!(edid.physical_size_mm(), Some((340.0, 190.0)));
        Ok(())
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_edid(&[0u8; 16]).is_err());
        assert!(parse_edid(&[0u8; 128]).is_err());
    }
}
