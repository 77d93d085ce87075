use std::io::Cursor;

use exif::{Field, In, Value};
use thiserror::Error;

use crate::photo_metadata::{TagMap, TagValue};

#[derive(Debug, Error)]
#[error("unreadable EXIF data: {0}")]
pub struct TagReadError(#[from] exif::Error);

/// Byte-level metadata extraction. Everything past this trait only sees tag names and values.
pub trait TagReader {
    fn read_tags(&self, bytes: &[u8]) -> Result<TagMap, TagReadError>;
}

/// [`TagReader`] backed by kamadak-exif. Reads JPEG, TIFF, HEIF, PNG and WebP containers.
#[derive(Debug, Default, Clone, Copy)]
pub struct KamadakReader;

impl TagReader for KamadakReader {
    fn read_tags(&self, bytes: &[u8]) -> Result<TagMap, TagReadError> {
        let mut cursor = Cursor::new(bytes);
        let exif = exif::Reader::new().read_from_container(&mut cursor)?;

        let tags = exif
            .fields()
            .filter(|field| field.ifd_num == In::PRIMARY)
            .map(|field| (field.tag.to_string(), tag_value(field)))
            .collect();
        Ok(tags)
    }
}

fn tag_value(field: &Field) -> TagValue {
    match &field.value {
        Value::Rational(rationals) => {
            TagValue::Rationals(rationals.iter().map(|r| r.to_f64()).collect())
        }
        Value::SRational(rationals) => {
            TagValue::Rationals(rationals.iter().map(|r| r.to_f64()).collect())
        }
        Value::Ascii(strings) => {
            let text = strings
                .iter()
                .map(|s| String::from_utf8_lossy(s).to_string())
                .collect::<Vec<_>>()
                .join(" ");
            TagValue::Text(text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
        }
        _ => TagValue::Text(field.display_value().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::experimental::Writer;
    use exif::{Rational, Tag};

    fn field(tag: Tag, value: Value) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    fn dms(d: u32, m: u32, s_num: u32, s_denom: u32) -> Value {
        Value::Rational(vec![
            Rational { num: d, denom: 1 },
            Rational { num: m, denom: 1 },
            Rational {
                num: s_num,
                denom: s_denom,
            },
        ])
    }

    fn ascii(text: &str) -> Value {
        Value::Ascii(vec![text.as_bytes().to_vec()])
    }

    #[test]
    fn reads_gps_and_text_tags_from_tiff() {
        let fields = [
            field(Tag::Make, ascii("Apple")),
            field(Tag::GPSLatitudeRef, ascii("N")),
            field(Tag::GPSLatitude, dms(36, 10, 1164, 100)),
            field(Tag::GPSLongitudeRef, ascii("W")),
            field(Tag::GPSLongitude, dms(115, 8, 2328, 100)),
        ];
        let mut writer = Writer::new();
        for f in &fields {
            writer.push_field(f);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();

        let tags = KamadakReader.read_tags(&buf.into_inner()).unwrap();

        assert_eq!(tags["Make"], TagValue::Text("Apple".into()));
        assert_eq!(tags["GPSLatitudeRef"], TagValue::Text("N".into()));
        assert_eq!(tags["GPSLatitude"].as_triple(), Some((36.0, 10.0, 11.64)));
        assert_eq!(tags["GPSLongitudeRef"], TagValue::Text("W".into()));
        assert_eq!(tags["GPSLongitude"].as_triple(), Some((115.0, 8.0, 23.28)));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(KamadakReader.read_tags(b"definitely not an image").is_err());
    }
}
