//! Length-prefixed channel framing and command/response wire types
//!
//! Both directions use the same framing: a 4-byte big-endian payload length
//! followed by that many bytes of ASCII. The channel is strict
//! request/response with no versioning or negotiation; anything malformed
//! is a fault that ends the worker.

use std::io::{Read, Write};
use std::path::PathBuf;

use crate::cache::RenderHandle;
use crate::error::Fault;

/// Largest accepted payload. Lengths beyond this are treated as a corrupt
/// stream rather than an allocation request.
pub const MAX_PAYLOAD: u32 = i32::MAX as u32;

/// Read one frame, blocking until the full payload arrives.
///
/// A zero length or EOF mid-frame means the peer is gone or the stream is
/// desynchronized; both are protocol faults.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, Fault> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    decode_after_header(reader, header)
}

/// Like [`read_frame`], but EOF exactly on a frame boundary is a clean end
/// of stream (`None`) rather than a fault. EOF inside a frame stays fatal.
pub fn read_frame_opt<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, Fault> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = match reader.read(&mut header[filled..]) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Fault::protocol("peer closed mid-frame"));
        }
        filled += n;
    }
    decode_after_header(reader, header).map(Some)
}

fn decode_after_header<R: Read>(reader: &mut R, header: [u8; 4]) -> Result<Vec<u8>, Fault> {
    let len = u32::from_be_bytes(header);

    if len == 0 {
        return Err(Fault::protocol("zero-length frame"));
    }
    if len > MAX_PAYLOAD {
        return Err(Fault::protocol(format!("frame length {len} out of range")));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Write one frame: length prefix, then payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), Fault> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&l| l <= MAX_PAYLOAD)
        .ok_or_else(|| Fault::protocol(format!("payload of {} bytes too large", payload.len())))?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Commands accepted from the control side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Open a document (mandatory authentication, no password on the wire).
    Open { path: PathBuf },
    /// Release a rendered page.
    Free { handle: RenderHandle },
    /// Scroll-position hint. No response.
    Layout { position: i64 },
    /// Set the target display geometry and recompute the layout.
    Geometry { width: i32, height: i32 },
    /// Rasterize one page. The trailing geometry fields are echoed by the
    /// control side but the render itself uses the layout entry.
    Render {
        page: usize,
        layout_index: usize,
        width: i32,
        height: i32,
    },
}

impl Command {
    /// Parse a decoded frame payload. Dispatch is on the first word.
    pub fn parse(payload: &[u8]) -> Result<Self, Fault> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| Fault::protocol("non-ASCII command frame"))?
            .trim_start();
        let mut words = text.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| Fault::protocol("empty command frame"))?;

        match verb {
            "open" => {
                // The path is everything after the verb, spaces included.
                let rest = text[verb.len()..].trim_start();
                if rest.is_empty() {
                    return Err(Fault::protocol("open: missing path"));
                }
                Ok(Self::Open {
                    path: PathBuf::from(rest),
                })
            }
            "free" => {
                let handle = words
                    .next()
                    .and_then(RenderHandle::from_hex)
                    .ok_or_else(|| Fault::protocol(format!("malformed free `{text}`")))?;
                Ok(Self::Free { handle })
            }
            "layout" => {
                let position = parse_field(&mut words, text, "layout")?;
                Ok(Self::Layout { position })
            }
            "geometry" => {
                let width = parse_field(&mut words, text, "geometry")?;
                let height = parse_field(&mut words, text, "geometry")?;
                Ok(Self::Geometry { width, height })
            }
            "render" => {
                let page = parse_field(&mut words, text, "render")?;
                let layout_index = parse_field(&mut words, text, "render")?;
                let width = parse_field(&mut words, text, "render")?;
                let height = parse_field(&mut words, text, "render")?;
                Ok(Self::Render {
                    page,
                    layout_index,
                    width,
                    height,
                })
            }
            _ => Err(Fault::protocol(format!("unknown command `{text}`"))),
        }
    }
}

fn parse_field<'a, T: std::str::FromStr>(
    words: &mut impl Iterator<Item = &'a str>,
    line: &str,
    verb: &str,
) -> Result<T, Fault> {
    words
        .next()
        .and_then(|w| w.parse().ok())
        .ok_or_else(|| Fault::protocol(format!("malformed {verb} `{line}`")))
}

/// Responses sent back to the control side, single-letter tagged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// `C <pagecount>`
    PageCount(usize),
    /// `l <pagenum> <pixelw> <pixelh>`, one per layout entry, emitted in
    /// descending layout-index order.
    LayoutEntry {
        page: usize,
        width: i32,
        height: i32,
    },
    /// `m <totalheightpx>`, the full strip height for the current target width.
    TotalHeight(i64),
    /// `r <pagenum> <w> <h> <handle>`; `w`/`h` are the current target
    /// geometry, matching what the control side last sent.
    Rendered {
        page: usize,
        width: i32,
        height: i32,
        handle: RenderHandle,
    },
}

impl Response {
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::PageCount(n) => format!("C {n}"),
            Self::LayoutEntry {
                page,
                width,
                height,
            } => format!("l {page} {width} {height}"),
            Self::TotalHeight(h) => format!("m {h}"),
            Self::Rendered {
                page,
                width,
                height,
                handle,
            } => format!("r {page} {width} {height} {handle}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn frame_round_trip() {
        let payloads: [&[u8]; 3] = [b"x", b"geometry 800 600", &[0x41u8; 4096]];
        for payload in payloads {
            let mut buf = Vec::new();
            write_frame(&mut buf, payload).expect("write");
            assert_eq!(&buf[..4], &(payload.len() as u32).to_be_bytes());

            let mut cursor = Cursor::new(buf);
            let decoded = read_frame(&mut cursor).expect("read");
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn consecutive_frames_decode_in_order() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"open a.pdf").unwrap();
        write_frame(&mut buf, b"geometry 800 600").unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"open a.pdf");
        assert_eq!(read_frame(&mut cursor).unwrap(), b"geometry 800 600");
    }

    #[test]
    fn eof_between_frames_is_clean_end() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(matches!(read_frame_opt(&mut cursor), Ok(None)));

        let mut buf = Vec::new();
        write_frame(&mut buf, b"free 1f").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame_opt(&mut cursor).unwrap().unwrap(), b"free 1f");
        assert!(matches!(read_frame_opt(&mut cursor), Ok(None)));
    }

    #[test]
    fn eof_inside_header_is_fault() {
        let mut cursor = Cursor::new(vec![0u8, 0]);
        assert!(matches!(
            read_frame_opt(&mut cursor),
            Err(Fault::Protocol { .. })
        ));
    }

    #[test]
    fn zero_length_frame_is_fault() {
        let mut cursor = Cursor::new(vec![0, 0, 0, 0]);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(Fault::Protocol { .. })
        ));
    }

    #[test]
    fn truncated_payload_is_fault() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"geometry 800 600").unwrap();
        buf.truncate(10);

        let mut cursor = Cursor::new(buf);
        assert!(matches!(read_frame(&mut cursor), Err(Fault::Io(_))));
    }

    #[test]
    fn parse_geometry() {
        let cmd = Command::parse(b"geometry 800 600").unwrap();
        assert_eq!(
            cmd,
            Command::Geometry {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn parse_render() {
        let cmd = Command::parse(b"render 3 2 800 600").unwrap();
        assert_eq!(
            cmd,
            Command::Render {
                page: 3,
                layout_index: 2,
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn parse_open_keeps_spaces_in_path() {
        let cmd = Command::parse(b"open /books/war and peace.pdf").unwrap();
        assert_eq!(
            cmd,
            Command::Open {
                path: PathBuf::from("/books/war and peace.pdf")
            }
        );
    }

    #[test]
    fn parse_free_hex_handle() {
        let cmd = Command::parse(b"free 1f").unwrap();
        assert_eq!(
            cmd,
            Command::Free {
                handle: RenderHandle::from_hex("1f").unwrap()
            }
        );
    }

    #[test]
    fn unknown_command_is_fault() {
        assert!(matches!(
            Command::parse(b"teleport 1"),
            Err(Fault::Protocol { .. })
        ));
    }

    #[test]
    fn malformed_arguments_are_faults() {
        for bad in [
            b"geometry 800".as_slice(),
            b"geometry w h",
            b"render 1 2",
            b"free xyzzy",
            b"open",
        ] {
            assert!(
                matches!(Command::parse(bad), Err(Fault::Protocol { .. })),
                "expected fault for {:?}",
                std::str::from_utf8(bad)
            );
        }
    }

    #[test]
    fn response_encoding() {
        assert_eq!(Response::PageCount(12).encode(), "C 12");
        assert_eq!(
            Response::LayoutEntry {
                page: 0,
                width: 600,
                height: 848
            }
            .encode(),
            "l 0 600 848"
        );
        assert_eq!(Response::TotalHeight(33920).encode(), "m 33920");

        let handle = RenderHandle::from_hex("ff").unwrap();
        assert_eq!(
            Response::Rendered {
                page: 4,
                width: 600,
                height: 800,
                handle
            }
            .encode(),
            "r 4 600 800 ff"
        );
    }
}
