use anyhow::Context;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

/// One XML event, owned. A part is kept as a flat event list so untouched regions can
/// be written back verbatim.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

impl XmlEvent {
    pub fn start(name: &str, attrs: &[(&str, &str)]) -> Self {
        Self::Start {
            name: name.to_string(),
            attrs: owned_attrs(attrs),
        }
    }

    pub fn empty(name: &str, attrs: &[(&str, &str)]) -> Self {
        Self::Empty {
            name: name.to_string(),
            attrs: owned_attrs(attrs),
        }
    }

    pub fn end(name: &str) -> Self {
        Self::End {
            name: name.to_string(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::Text {
            text: text.to_string(),
        }
    }

    pub fn attrs(&self) -> &[(String, String)] {
        match self {
            Self::Start { attrs, .. } | Self::Empty { attrs, .. } => attrs,
            _ => &[],
        }
    }
}

// Values given here are plain text; stored attribute values are raw (escaped) XML.
fn owned_attrs(attrs: &[(&str, &str)]) -> Vec<(String, String)> {
    attrs
        .iter()
        .map(|(k, v)| (k.to_string(), escape(*v).into_owned()))
        .collect()
}

/// Unescaped value of attribute `key`.
pub fn attr_value(attrs: &[(String, String)], key: &str) -> Option<String> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| {
        unescape(v.as_str())
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| v.clone())
    })
}

pub fn parse_events(xml_bytes: &[u8]) -> anyhow::Result<Vec<XmlEvent>> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader.read_event_into(&mut buf).with_context(|| {
            format!("read xml event at byte {}", reader.buffer_position())
        })?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = bytes_to_string(d.version().context("decl version")?);
                let encoding = d
                    .encoding()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                let standalone = d
                    .standalone()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                events.push(XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => events.push(XmlEvent::Start {
                name: bytes_to_string(s.name().as_ref()),
                attrs: collect_attrs(&s)?,
            }),
            Event::End(e) => events.push(XmlEvent::End {
                name: bytes_to_string(e.name().as_ref()),
            }),
            Event::Empty(s) => events.push(XmlEvent::Empty {
                name: bytes_to_string(s.name().as_ref()),
                attrs: collect_attrs(&s)?,
            }),
            Event::Text(t) => {
                let text = t.unescape().context("unescape text")?.into_owned();
                events.push(XmlEvent::Text { text });
            }
            Event::CData(t) => events.push(XmlEvent::CData {
                text: bytes_to_string(t.into_inner()),
            }),
            Event::Comment(t) => events.push(XmlEvent::Comment {
                text: bytes_to_string(t.into_inner()),
            }),
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                events.push(XmlEvent::PI {
                    content: format!("{target}{content}"),
                });
            }
            Event::DocType(t) => events.push(XmlEvent::DocType {
                text: bytes_to_string(t.into_inner()),
            }),
        }
    }
    Ok(events)
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        // Raw bytes: character references such as `&#xD;` must survive a round trip.
        attrs.push((
            bytes_to_string(a.key.as_ref()),
            bytes_to_string(a.value.as_ref()),
        ));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

pub fn write_events(events: &[XmlEvent]) -> anyhow::Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    for ev in events {
        write_event(&mut out, ev)?;
    }
    Ok(out)
}

fn write_event(out: &mut Vec<u8>, ev: &XmlEvent) -> anyhow::Result<()> {
    match ev {
        XmlEvent::Decl {
            version,
            encoding,
            standalone,
        } => {
            let d = BytesDecl::new(version.as_str(), encoding.as_deref(), standalone.as_deref());
            let mut writer = quick_xml::Writer::new(Vec::new());
            writer.write_event(Event::Decl(d)).context("write decl")?;
            out.extend_from_slice(&writer.into_inner());
        }
        XmlEvent::Start { name, attrs } => write_start_like(out, name, attrs, false),
        XmlEvent::End { name } => {
            out.extend_from_slice(b"</");
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b">");
        }
        XmlEvent::Empty { name, attrs } => write_start_like(out, name, attrs, true),
        XmlEvent::Text { text } => {
            for ch in text.chars() {
                match ch {
                    '&' => out.extend_from_slice(b"&amp;"),
                    '<' => out.extend_from_slice(b"&lt;"),
                    '>' => out.extend_from_slice(b"&gt;"),
                    _ => {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    }
                }
            }
        }
        XmlEvent::CData { text } => {
            out.extend_from_slice(b"<![CDATA[");
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b"]]>");
        }
        XmlEvent::Comment { text } => {
            out.extend_from_slice(b"<!--");
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b"-->");
        }
        XmlEvent::PI { content } => {
            out.extend_from_slice(b"<?");
            out.extend_from_slice(content.as_bytes());
            out.extend_from_slice(b"?>");
        }
        XmlEvent::DocType { text } => {
            out.extend_from_slice(b"<!DOCTYPE");
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b">");
        }
    }
    Ok(())
}

fn write_start_like(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
    out.extend_from_slice(b"<");
    out.extend_from_slice(name.as_bytes());
    for (k, v) in attrs {
        out.extend_from_slice(b" ");
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v.as_bytes());
        out.extend_from_slice(b"\"");
    }
    out.extend_from_slice(if empty { b"/>" } else { b">" });
}
