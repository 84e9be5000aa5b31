//! Structured XML codec.
//!
//! Every payload is one XML document. The root tag names the category
//! (`command`, `event`, `error`, `success`); for `command` and `event` a
//! `name` attribute selects the subtype. Scalar fields are child elements
//! holding a single text node:
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8" standalone="no"?><command name="login"><name>alice</name><type>tcp_chat/0.1.0</type></command>
//! <?xml version="1.0" encoding="UTF-8" standalone="no"?><success><session>6f1c...</session></success>
//! <?xml version="1.0" encoding="UTF-8" standalone="no"?><success><listusers><user><name>alice</name><type>x</type></user></listusers></success>
//! ```
//!
//! Documents are written without whitespace between elements. On the read
//! side whitespace-only text between elements is tolerated, anything else
//! that does not fit the schema is a [`ParsingError`].

use std::fmt::Display;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::codec::WireCodec;
use crate::error::ParsingError;
use crate::message::{ChatLine, Login, Message};
use crate::types::Usid;

const COMMAND: &str = "command";
const EVENT: &str = "event";
const ERROR: &str = "error";
const SUCCESS: &str = "success";

/// [`WireCodec`] speaking the XML schema above
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

impl WireCodec for XmlCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ParsingError> {
        let mut doc = DocumentWriter::new()?;
        match message {
            Message::ClientLogin(login) => {
                doc.open(COMMAND, Some("login"))?;
                doc.field("name", &login.name)?;
                doc.field("type", &login.client_tag)?;
                doc.close(COMMAND)?;
            }
            Message::ClientListRequest { usid } => {
                doc.open(COMMAND, Some("list"))?;
                doc.field("session", &usid.to_string())?;
                doc.close(COMMAND)?;
            }
            Message::ClientMessage { text, usid } => {
                doc.open(COMMAND, Some("message"))?;
                doc.field("message", text)?;
                doc.field("session", &usid.to_string())?;
                doc.close(COMMAND)?;
            }
            Message::ClientLogout { usid } => {
                doc.open(COMMAND, Some("logout"))?;
                doc.field("session", &usid.to_string())?;
                doc.close(COMMAND)?;
            }
            Message::ServerLoginSuccess { usid } => {
                doc.open(SUCCESS, None)?;
                doc.field("session", &usid.to_string())?;
                doc.close(SUCCESS)?;
            }
            Message::ServerListResponse { users } => {
                doc.open(SUCCESS, None)?;
                if users.is_empty() {
                    doc.empty("listusers")?;
                } else {
                    doc.open("listusers", None)?;
                    for user in users {
                        doc.open("user", None)?;
                        doc.field("name", &user.name)?;
                        doc.field("type", &user.client_tag)?;
                        doc.close("user")?;
                    }
                    doc.close("listusers")?;
                }
                doc.close(SUCCESS)?;
            }
            Message::ServerEmptySuccess => doc.empty(SUCCESS)?,
            Message::ServerError { text } => {
                doc.open(ERROR, None)?;
                doc.field("message", text)?;
                doc.close(ERROR)?;
            }
            Message::ServerMessage(line) => {
                doc.open(EVENT, Some("message"))?;
                doc.field("message", &line.text)?;
                doc.field("name", &line.name)?;
                doc.close(EVENT)?;
            }
            Message::ServerUserLogin { name } => {
                doc.open(EVENT, Some("userlogin"))?;
                doc.field("name", name)?;
                doc.close(EVENT)?;
            }
            Message::ServerUserLogout { name } => {
                doc.open(EVENT, Some("userlogout"))?;
                doc.field("name", name)?;
                doc.close(EVENT)?;
            }
        }
        Ok(doc.finish())
    }

    fn decode(&self, payload: &[u8]) -> Result<Message, ParsingError> {
        let root = parse_document(payload)?;
        let subtype = root.subtype.as_deref();
        let message = match (root.name.as_str(), subtype) {
            (COMMAND, Some("login")) => Message::ClientLogin(Login {
                name: root.field("name")?,
                client_tag: root.field("type")?,
            }),
            (COMMAND, Some("list")) => Message::ClientListRequest {
                usid: root.usid_field()?,
            },
            (COMMAND, Some("message")) => Message::ClientMessage {
                text: root.field("message")?,
                usid: root.usid_field()?,
            },
            (COMMAND, Some("logout")) => Message::ClientLogout {
                usid: root.usid_field()?,
            },
            (EVENT, Some("message")) => Message::ServerMessage(ChatLine {
                text: root.field("message")?,
                name: root.field("name")?,
            }),
            (EVENT, Some("userlogin")) => Message::ServerUserLogin {
                name: root.field("name")?,
            },
            (EVENT, Some("userlogout")) => Message::ServerUserLogout {
                name: root.field("name")?,
            },
            (COMMAND | EVENT, _) => {
                return Err(ParsingError::UnknownSubtype {
                    root: root.name.clone(),
                    name: root.subtype.clone(),
                })
            }
            (ERROR, _) => Message::ServerError {
                text: root.field("message")?,
            },
            (SUCCESS, _) => decode_success(&root)?,
            (other, _) => return Err(ParsingError::UnknownRoot(other.to_string())),
        };
        Ok(message)
    }
}

fn decode_success(root: &Element) -> Result<Message, ParsingError> {
    let children = root.elements()?;
    let only = match children.as_slice() {
        [] => return Ok(Message::ServerEmptySuccess),
        [only] => *only,
        _ => {
            return Err(ParsingError::UnexpectedContent(
                "<success> holds more than one child".to_string(),
            ))
        }
    };

    match only.name.as_str() {
        "session" => Ok(Message::ServerLoginSuccess {
            usid: parse_usid(only.text("session")?)?,
        }),
        "listusers" => {
            let mut users = Vec::new();
            for user in only.elements()? {
                if user.name != "user" {
                    return Err(ParsingError::UnexpectedContent(format!(
                        "<{}> inside <listusers>",
                        user.name
                    )));
                }
                users.push(Login {
                    name: user.field("name")?,
                    client_tag: user.field("type")?,
                });
            }
            Ok(Message::ServerListResponse { users })
        }
        other => Err(ParsingError::UnexpectedContent(format!(
            "<{}> inside <success>",
            other
        ))),
    }
}

fn parse_usid(text: String) -> Result<Usid, ParsingError> {
    text.parse().map_err(|_| ParsingError::InvalidUsid(text))
}

fn xml_error(err: impl Display) -> ParsingError {
    ParsingError::Xml(err.to_string())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

struct DocumentWriter {
    writer: Writer<Vec<u8>>,
}

impl DocumentWriter {
    fn new() -> Result<Self, ParsingError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))
            .map_err(xml_error)?;
        Ok(Self { writer })
    }

    fn open(&mut self, tag: &str, subtype: Option<&str>) -> Result<(), ParsingError> {
        let mut start = BytesStart::new(tag);
        if let Some(subtype) = subtype {
            start.push_attribute(("name", subtype));
        }
        self.writer
            .write_event(Event::Start(start))
            .map_err(xml_error)
    }

    fn close(&mut self, tag: &str) -> Result<(), ParsingError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(xml_error)
    }

    fn empty(&mut self, tag: &str) -> Result<(), ParsingError> {
        self.writer
            .write_event(Event::Empty(BytesStart::new(tag)))
            .map_err(xml_error)
    }

    /// `<tag>text</tag>`, or `<tag/>` for the empty string
    fn field(&mut self, tag: &str, text: &str) -> Result<(), ParsingError> {
        if text.is_empty() {
            return self.empty(tag);
        }
        self.open(tag, None)?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))
            .map_err(xml_error)?;
        self.close(tag)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug)]
struct Element {
    name: String,
    /// Value of the `name` attribute, if present
    subtype: Option<String>,
    children: Vec<Node>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, ParsingError> {
        let name = String::from_utf8(start.name().as_ref().to_vec()).map_err(xml_error)?;
        let mut subtype = None;
        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            if attr.key.as_ref() == b"name" {
                subtype = Some(attr.unescape_value().map_err(xml_error)?.into_owned());
            }
        }
        Ok(Self {
            name,
            subtype,
            children: Vec::new(),
        })
    }

    fn push_text(&mut self, text: &str) {
        // adjacent text and CDATA form one logical text node
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    /// Element children; stray non-whitespace text is rejected.
    fn elements(&self) -> Result<Vec<&Element>, ParsingError> {
        let mut elements = Vec::new();
        for child in &self.children {
            match child {
                Node::Element(element) => elements.push(element),
                Node::Text(text) if text.trim().is_empty() => {}
                Node::Text(text) => {
                    return Err(ParsingError::UnexpectedContent(format!(
                        "text {:?} inside <{}>",
                        text, self.name
                    )))
                }
            }
        }
        Ok(elements)
    }

    /// Text of the single direct child element called `tag`.
    fn field(&self, tag: &str) -> Result<String, ParsingError> {
        let mut found = None;
        for element in self.elements()? {
            if element.name == tag {
                if found.is_some() {
                    return Err(ParsingError::DuplicateField(tag.to_string()));
                }
                found = Some(element);
            }
        }
        found
            .ok_or_else(|| ParsingError::MissingField(tag.to_string()))?
            .text(tag)
    }

    fn usid_field(&self) -> Result<Usid, ParsingError> {
        parse_usid(self.field("session")?)
    }

    fn text(&self, tag: &str) -> Result<String, ParsingError> {
        match self.children.as_slice() {
            [] => Ok(String::new()),
            [Node::Text(text)] => Ok(text.clone()),
            _ => Err(ParsingError::InvalidField(tag.to_string())),
        }
    }
}

fn parse_document(payload: &[u8]) -> Result<Element, ParsingError> {
    let mut reader = Reader::from_reader(payload);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    ParsingError::UnexpectedContent("unbalanced end tag".to_string())
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?;
                add_text(&mut stack, &text)?;
            }
            Event::CData(cdata) => {
                let text = String::from_utf8(cdata.into_inner().into_owned()).map_err(xml_error)?;
                add_text(&mut stack, &text)?;
            }
            Event::Eof => break,
            // declaration, comments, processing instructions, doctype
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParsingError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| ParsingError::Xml("document has no root element".to_string()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ParsingError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(ParsingError::UnexpectedContent(
                "more than one root element".to_string(),
            ))
        }
    }
    Ok(())
}

fn add_text(stack: &mut [Element], text: &str) -> Result<(), ParsingError> {
    match stack.last_mut() {
        Some(parent) => parent.push_text(text),
        None if text.trim().is_empty() => {}
        None => {
            return Err(ParsingError::UnexpectedContent(
                "text outside the root element".to_string(),
            ))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#;

    fn decode_str(body: &str) -> Result<Message, ParsingError> {
        XmlCodec.decode(format!("{}{}", DECL, body).as_bytes())
    }

    fn encode_str(msg: &Message) -> String {
        String::from_utf8(XmlCodec.encode(msg).unwrap()).unwrap()
    }

    #[test]
    fn test_encode_login_exact() {
        let msg = Message::ClientLogin(Login::new("alice", "cli"));
        assert_eq!(
            encode_str(&msg),
            format!(
                "{}<command name=\"login\"><name>alice</name><type>cli</type></command>",
                DECL
            )
        );
    }

    #[test]
    fn test_encode_success_forms() {
        assert_eq!(
            encode_str(&Message::ServerEmptySuccess),
            format!("{}<success/>", DECL)
        );

        let usid: Usid = "0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap();
        assert_eq!(
            encode_str(&Message::ServerLoginSuccess { usid }),
            format!(
                "{}<success><session>0f8fad5b-d9cb-469f-a165-70867728950e</session></success>",
                DECL
            )
        );

        let list = Message::ServerListResponse {
            users: vec![Login::new("alice", "a")],
        };
        assert_eq!(
            encode_str(&list),
            format!(
                "{}<success><listusers><user><name>alice</name><type>a</type></user></listusers></success>",
                DECL
            )
        );
    }

    #[test]
    fn test_encode_event_and_error_exact() {
        let msg = Message::ServerMessage(ChatLine {
            text: "a < b".to_string(),
            name: "bob".to_string(),
        });
        assert_eq!(
            encode_str(&msg),
            format!(
                "{}<event name=\"message\"><message>a &lt; b</message><name>bob</name></event>",
                DECL
            )
        );
        assert_eq!(
            encode_str(&Message::error("Server closed")),
            format!("{}<error><message>Server closed</message></error>", DECL)
        );
    }

    #[test]
    fn test_decode_without_declaration() {
        let msg = XmlCodec
            .decode(b"<event name=\"userlogout\"><name>bob</name></event>")
            .unwrap();
        assert_eq!(
            msg,
            Message::ServerUserLogout {
                name: "bob".to_string()
            }
        );
    }

    #[test]
    fn test_decode_tolerates_indentation() {
        let msg = decode_str(
            "<command name=\"login\">\n  <name>alice</name>\n  <type>cli</type>\n</command>\n",
        )
        .unwrap();
        assert_eq!(msg, Message::ClientLogin(Login::new("alice", "cli")));
    }

    #[test]
    fn test_empty_text_round_trip() {
        let msg = Message::error("");
        assert_eq!(encode_str(&msg), format!("{}<error><message/></error>", DECL));
        assert_eq!(XmlCodec.decode(encode_str(&msg).as_bytes()).unwrap(), msg);
    }

    #[test]
    fn test_reject_unknown_command_name() {
        let err = decode_str("<command name=\"shout\"><message>x</message></command>").unwrap_err();
        assert!(matches!(err, ParsingError::UnknownSubtype { .. }));

        let err = decode_str("<event><name>x</name></event>").unwrap_err();
        assert!(matches!(err, ParsingError::UnknownSubtype { name: None, .. }));
    }

    #[test]
    fn test_reject_unknown_root() {
        let err = decode_str("<ping/>").unwrap_err();
        assert!(matches!(err, ParsingError::UnknownRoot(root) if root == "ping"));
    }

    #[test]
    fn test_reject_success_with_two_children() {
        let err = decode_str(
            "<success><session>0f8fad5b-d9cb-469f-a165-70867728950e</session><listusers/></success>",
        )
        .unwrap_err();
        assert!(matches!(err, ParsingError::UnexpectedContent(_)));
    }

    #[test]
    fn test_reject_missing_field() {
        let err = decode_str("<command name=\"login\"><name>alice</name></command>").unwrap_err();
        assert!(matches!(err, ParsingError::MissingField(field) if field == "type"));
    }

    #[test]
    fn test_reject_duplicate_field() {
        let err = decode_str(
            "<command name=\"login\"><name>a</name><name>b</name><type>t</type></command>",
        )
        .unwrap_err();
        assert!(matches!(err, ParsingError::DuplicateField(field) if field == "name"));
    }

    #[test]
    fn test_reject_nested_field_content() {
        let err = decode_str("<error><message><b>bold</b></message></error>").unwrap_err();
        assert!(matches!(err, ParsingError::InvalidField(_)));
    }

    #[test]
    fn test_reject_malformed_session() {
        let err = decode_str("<command name=\"logout\"><session>nope</session></command>").unwrap_err();
        assert!(matches!(err, ParsingError::InvalidUsid(text) if text == "nope"));
    }

    #[test]
    fn test_reject_bad_list_entry() {
        let err = decode_str("<success><listusers><admin/></listusers></success>").unwrap_err();
        assert!(matches!(err, ParsingError::UnexpectedContent(_)));
    }

    #[test]
    fn test_reject_truncated_document() {
        assert!(decode_str("<error><message>oops</message>").is_err());
        assert!(XmlCodec.decode(b"").is_err());
    }
}
