//! Extensive DSL unit tests: syntax (parse success/failure) and spec
//! serialization round-trips.

use faultwire::{
    parse_request, parse_requests, parse_response, Action, DataClass, Message, MethodToken,
    Offset, PauseDuration, RequestFlavor, ResponseFlavor, SizeUnit, Token, Value,
};

// ==================== Syntax: valid responses ====================

#[test]
fn parse_bare_code() {
    let r = parse_response("200").expect("parse");
    assert_eq!(r.flavor, ResponseFlavor::Http);
    assert_eq!(r.code(), Some(200));
    assert!(r.reason().is_none());
    assert!(r.body().is_none());
}

#[test]
fn parse_reason_token() {
    let r = parse_response("400:m'go away'").expect("parse");
    assert_eq!(r.code(), Some(400));
    assert_eq!(r.reason(), Some(&Value::literal("go away")));
}

#[test]
fn parse_inline_reason() {
    // A quoted literal directly after the code is reason sugar.
    let r = parse_response("400'go away'").expect("parse");
    assert_eq!(r.code(), Some(400));
    assert_eq!(r.reason(), Some(&Value::literal("go away")));
}

#[test]
fn parse_body_forms() {
    let r = parse_response("200:b'foo'").expect("parse");
    assert_eq!(r.body(), Some(&Value::literal("foo")));

    let r = parse_response("200:b\"foo\"").expect("parse");
    assert_eq!(r.body(), Some(&Value::literal("foo")));

    let r = parse_response("200:b@100k,digits").expect("parse");
    assert_eq!(
        r.body(),
        Some(&Value::Generated {
            size: 100,
            unit: SizeUnit::Kilo,
            class: DataClass::Digits,
        })
    );

    let r = parse_response("200:b@1").expect("parse");
    assert_eq!(
        r.body(),
        Some(&Value::Generated {
            size: 1,
            unit: SizeUnit::Bytes,
            class: DataClass::Bytes,
        })
    );
}

#[test]
fn parse_file_values() {
    let r = parse_response("200:b<'body.txt'").expect("parse");
    assert_eq!(
        r.body(),
        Some(&Value::File {
            path: "body.txt".to_string(),
            quoted: true,
        })
    );

    let r = parse_response("200:b<body.txt").expect("parse");
    assert_eq!(
        r.body(),
        Some(&Value::File {
            path: "body.txt".to_string(),
            quoted: false,
        })
    );
}

#[test]
fn parse_headers_and_shortcuts() {
    let r = parse_response("200:h'X-Foo'='bar':c'text/plain':l'/elsewhere'").expect("parse");
    let headers = r.headers();
    assert_eq!(headers.len(), 3);
    assert_eq!(headers[0].key, Value::literal("X-Foo"));
    assert_eq!(headers[0].value, Value::literal("bar"));
    assert_eq!(headers[1].key, Value::literal("Content-Type"));
    assert_eq!(headers[1].value, Value::literal("text/plain"));
    assert_eq!(headers[2].key, Value::literal("Location"));
}

#[test]
fn parse_actions() {
    let r = parse_response("200:b'foo':d0:dr:p1,5:p0,f:i2,'xx':ir,@10").expect("parse");
    let actions = r.actions();
    assert_eq!(actions.len(), 6);
    assert_eq!(
        actions[0],
        &Action::DisconnectAt {
            offset: Offset::Absolute(0)
        }
    );
    assert_eq!(
        actions[1],
        &Action::DisconnectAt {
            offset: Offset::Random
        }
    );
    assert_eq!(
        actions[2],
        &Action::PauseAt {
            offset: Offset::Absolute(1),
            duration: PauseDuration::Seconds(5)
        }
    );
    assert_eq!(
        actions[3],
        &Action::PauseAt {
            offset: Offset::Absolute(0),
            duration: PauseDuration::Forever
        }
    );
    assert_eq!(
        actions[4],
        &Action::InjectAt {
            offset: Offset::Absolute(2),
            value: Value::literal("xx")
        }
    );
    assert!(matches!(
        actions[5],
        Action::InjectAt {
            offset: Offset::Random,
            ..
        }
    ));
}

#[test]
fn parse_after_offset() {
    let r = parse_response("200:da").expect("parse");
    assert_eq!(
        r.actions()[0],
        &Action::DisconnectAt {
            offset: Offset::After
        }
    );
}

#[test]
fn parse_raw_flag() {
    let r = parse_response("200:r:b'foo'").expect("parse");
    assert!(r.raw());
    assert!(!parse_response("200:b'foo'").expect("parse").raw());
}

#[test]
fn parse_escapes_in_literals() {
    let r = parse_response(r"200:b'\x00\xff'").expect("parse");
    assert_eq!(r.body(), Some(&Value::literal(vec![0u8, 0xff])));

    let r = parse_response(r"200:b'a\'b'").expect("parse");
    assert_eq!(r.body(), Some(&Value::literal("a'b")));

    let r = parse_response(r"200:b'a\nb\tc'").expect("parse");
    assert_eq!(r.body(), Some(&Value::literal("a\nb\tc")));
}

// ==================== Syntax: valid requests ====================

#[test]
fn parse_minimal_request() {
    let r = parse_request("get:/foo").expect("parse");
    assert_eq!(r.flavor, RequestFlavor::Http);
    assert_eq!(r.method(), Some(&MethodToken::Get));
    assert_eq!(r.path(), Some(&Value::naked("/foo")));
}

#[test]
fn parse_method_forms() {
    assert_eq!(
        parse_request("GET:/").expect("parse").method(),
        Some(&MethodToken::Get)
    );
    assert_eq!(
        parse_request("post:/").expect("parse").method(),
        Some(&MethodToken::Post)
    );
    assert_eq!(
        parse_request("'PATCH':/").expect("parse").method(),
        Some(&MethodToken::Explicit(Value::literal("PATCH")))
    );
}

#[test]
fn parse_request_tokens() {
    let r = parse_request("get:/:h'a'='b':b'body':ua:r").expect("parse");
    assert_eq!(r.headers().len(), 2);
    assert_eq!(r.body(), Some(&Value::literal("body")));
    assert!(r.raw());
}

#[test]
fn parse_user_agent_shortcuts() {
    let r = parse_request("get:/:ua").expect("parse");
    let h = r.headers()[0];
    assert_eq!(h.key, Value::literal("User-Agent"));
    match &h.value {
        Value::Literal { val, .. } => {
            assert!(String::from_utf8_lossy(val).contains("Android"))
        }
        other => panic!("expected literal, got {:?}", other),
    }

    let r = parse_request("get:/:u'my agent'").expect("parse");
    assert_eq!(r.headers()[0].value, Value::literal("my agent"));
}

#[test]
fn parse_nested_response_spec() {
    let r = parse_request(r"get:/:s'200:b\'nest\''").expect("parse");
    let nested = r
        .tokens
        .iter()
        .find_map(|t| match t {
            Token::Nested(resp) => Some(resp),
            _ => None,
        })
        .expect("nested token");
    assert_eq!(nested.code(), Some(200));
    assert_eq!(nested.body(), Some(&Value::literal("nest")));
}

#[test]
fn parse_websocket_requests() {
    let r = parse_request("ws:/chat/").expect("parse");
    assert_eq!(r.flavor, RequestFlavor::Websocket);
    assert!(r.method().is_none());
    assert_eq!(r.path(), Some(&Value::naked("/chat/")));

    let r = parse_request("ws:put:/chat/").expect("parse");
    assert_eq!(r.flavor, RequestFlavor::Websocket);
    assert_eq!(r.method(), Some(&MethodToken::Put));
}

#[test]
fn parse_websocket_frame_request() {
    let r = parse_request("wf:b'payload'").expect("parse");
    assert_eq!(r.flavor, RequestFlavor::WebsocketFrame);
    assert_eq!(r.body(), Some(&Value::literal("payload")));
}

#[test]
fn parse_websocket_response() {
    let r = parse_response("ws").expect("parse");
    assert_eq!(r.flavor, ResponseFlavor::Websocket);
    assert!(r.code().is_none());
}

// ==================== Multiple requests ====================

#[test]
fn parse_space_separated_requests() {
    let rs = parse_requests("get:/p1 get:/p2").expect("parse");
    assert_eq!(rs.len(), 2);
    assert_eq!(rs[0].path(), Some(&Value::naked("/p1")));
    assert_eq!(rs[1].path(), Some(&Value::naked("/p2")));
}

#[test]
fn parse_multiline_requests() {
    let src = "get:/p1:h'a'='b'\npost:/p2:b'body'\n";
    let rs = parse_requests(src).expect("parse");
    assert_eq!(rs.len(), 2);
    assert_eq!(rs[0].headers().len(), 1);
    assert_eq!(rs[1].method(), Some(&MethodToken::Post));
}

#[test]
fn parse_request_spanning_lines() {
    // Whitespace works as a token separator within one request; a new
    // request starts at the next bare method word.
    let src = "get:/p1\n  h'a'='b'\n  b'body'\nget:/p2";
    let rs = parse_requests(src).expect("parse");
    assert_eq!(rs.len(), 2);
    assert_eq!(rs[0].headers().len(), 1);
    assert_eq!(rs[0].body(), Some(&Value::literal("body")));
    assert!(rs[1].body().is_none());
}

// ==================== Syntax: failures ====================

#[test]
fn reject_malformed_specs() {
    assert!(parse_response("").is_err());
    assert!(parse_response("foo").is_err());
    assert!(parse_response("200:b").is_err());
    assert!(parse_response("200:msg,b:").is_err());
    assert!(parse_response("200:d").is_err());
    assert!(parse_response("200:p0").is_err());
    assert!(parse_response("200:i0").is_err());
    assert!(parse_request("get").is_err());
    assert!(parse_request("get:/:s'foo'").is_err());
}

#[test]
fn reject_non_ascii() {
    assert!(parse_response("200:b'héllo'").is_err());
    assert!(parse_request("get:/p\u{00e9}th").is_err());
}

#[test]
fn reject_out_of_range_numbers() {
    let e = parse_response("99999").expect_err("code overflow");
    assert!(e.message.contains("status code"));
    assert!(parse_response("200:d99999999999999999999999").is_err());

    // The size fits in u64 but the byte count does not.
    let e = parse_response("200:b@18446744073709551615g").expect_err("size overflow");
    assert!(e.message.contains("generated size"));
    assert!(parse_response("200:b@99999999999999999999999").is_err());
}

#[test]
fn reject_unknown_data_class() {
    let e = parse_response("200:b@1,bogus").expect_err("unknown class");
    assert!(e.message.contains("bogus"));
}

#[test]
fn reject_bad_nested_spec() {
    let e = parse_request("get:/:s'not a response'").expect_err("bad nested spec");
    assert!(e.message.contains("nested"));
}

#[test]
fn parse_errors_carry_position() {
    let e = parse_response("200:b@1,bogus").expect_err("unknown class");
    assert_eq!(e.line, 1);
    assert!(e.column > 1);
    assert!(!e.marked().is_empty());
}

// ==================== Spec round-trips ====================

/// Serializing a parsed message and reparsing it must be a fixpoint.
fn assert_response_fixpoint(src: &str) {
    let first = parse_response(src).expect("parse").spec();
    let second = parse_response(&first).expect("reparse").spec();
    assert_eq!(first, second, "source {:?}", src);
}

fn assert_request_fixpoint(src: &str) {
    let first = parse_request(src).expect("parse").spec();
    let second = parse_request(&first).expect("reparse").spec();
    assert_eq!(first, second, "source {:?}", src);
}

#[test]
fn response_spec_fixpoints() {
    for src in [
        "200",
        "400:m'go away'",
        "400'inline reason'",
        "200:b'foo'",
        "200:b@100k,digits",
        "200:b@1",
        "200:b<'somefile'",
        "200:b<somefile",
        "200:h'a'='b':c'text/plain':l'/there'",
        "200:r:b'foo':d0:dr:da:p0,f:pr,5:i2,'xx'",
        "ws",
        "ws:b'frame'",
    ] {
        assert_response_fixpoint(src);
    }
}

#[test]
fn request_spec_fixpoints() {
    for src in [
        "get:/foo",
        "get:'/quoted path'",
        "'PATCH':/foo",
        "get:/:h'a'='b':b@10:ua:u'custom':c'text/html'",
        r"get:/:s'200:b\'nest\''",
        "ws:/chat/",
        "ws:put:/chat/",
        "wf:b'payload'",
    ] {
        assert_request_fixpoint(src);
    }
}

#[test]
fn shortcut_headers_keep_their_surface_form() {
    let r = parse_response("200:c'text/plain'").expect("parse");
    assert_eq!(r.spec(), "200:c'text/plain'");
    let r = parse_request("get:/:ua").expect("parse");
    assert_eq!(r.spec(), "get:/:ua");
}

#[test]
fn binary_literals_roundtrip_through_spec() {
    let r = parse_response(r"200:b'\x00\x01\xfe\xff'").expect("parse");
    let body = r.body().expect("body").clone();
    let reparsed = parse_response(&r.spec()).expect("reparse");
    assert_eq!(reparsed.body(), Some(&body));
    assert_eq!(body, Value::literal(vec![0u8, 1, 0xfe, 0xff]));
}
