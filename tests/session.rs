//! End-to-end tests: a real server on a loopback socket, driven by a
//! scripted IMAP client.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use mailhouse::config::Config;
use mailhouse::server::Server;
use mailhouse::store::{MemoryStore, MessageStore};

const MAIL: &str = "Subject: hi\r\n\r\nbody!\r\n";

fn test_config(no_auth: bool) -> Config {
    Config {
        imap_addr: "127.0.0.1:0".into(),
        tls_cert: None,
        tls_key: None,
        db_path: None,
        user_name: (!no_auth).then(|| "bob".into()),
        user_password: (!no_auth).then(|| "s3cret".into()),
        no_auth,
        conn_log: None,
    }
}

async fn spawn_server(no_auth: bool) -> std::net::SocketAddr {
    let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
    store.create_mailbox("INBOX").await.unwrap();

    let server = Server::bind(test_config(no_auth), store).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    addr
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    /// Connect and consume the greeting.
    async fn connect(addr: std::net::SocketAddr) -> (Self, String) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read),
            writer,
        };
        let greeting = client.line().await;
        (client, greeting)
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    async fn send_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
    }

    /// One response line, CRLF stripped.
    async fn line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.unwrap();
        assert!(n > 0, "connection closed while expecting a line");
        line.trim_end_matches(['\r', '\n']).to_owned()
    }

    /// Lines up to and including the tagged completion for `tag`.
    async fn until_tagged(&mut self, tag: &str) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.line().await;
            let done = line.starts_with(&format!("{tag} "));
            lines.push(line);
            if done {
                return lines;
            }
        }
    }

    async fn login(&mut self) {
        self.send("A0 LOGIN bob s3cret").await;
        assert_eq!(self.line().await, "A0 OK LOGIN Completed");
    }

    /// True when the server has closed the connection.
    async fn closed(&mut self) -> bool {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap() == 0
    }
}

#[tokio::test]
async fn test_greeting_and_login() {
    let addr = spawn_server(false).await;
    let (mut client, greeting) = Client::connect(addr).await;

    assert_eq!(greeting, "* OK IMAP4rev1 server ready");

    client.send("A1 LOGIN bob wrong").await;
    assert_eq!(client.line().await, "A1 NO invalid credentials");

    client.send("A2 LOGIN bob s3cret").await;
    assert_eq!(client.line().await, "A2 OK LOGIN Completed");

    // Already authenticated now.
    client.send("A3 LOGIN bob s3cret").await;
    assert_eq!(client.line().await, "A3 BAD command not valid in this state");
}

#[tokio::test]
async fn test_login_with_literal_password() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    client.send("A1 LOGIN bob {6}").await;
    assert_eq!(client.line().await, "+");
    client.send("s3cret").await;
    assert_eq!(client.line().await, "A1 OK LOGIN Completed");
}

#[tokio::test]
async fn test_authenticate_plain() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    // `\0bob\0s3cret` in base64, sent after the continuation request.
    client.send("A1 AUTHENTICATE PLAIN").await;
    assert_eq!(client.line().await, "+");
    client.send("AGJvYgBzM2NyZXQ=").await;
    assert_eq!(client.line().await, "A1 OK AUTHENTICATE Completed");
}

#[tokio::test]
async fn test_authenticate_plain_initial_response() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    client.send("A1 AUTHENTICATE PLAIN AGJvYgBzM2NyZXQ=").await;
    assert_eq!(client.line().await, "A1 OK AUTHENTICATE Completed");
}

#[tokio::test]
async fn test_authenticate_unsupported_mechanism() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    client.send("A1 AUTHENTICATE GSSAPI").await;
    assert_eq!(
        client.line().await,
        "A1 NO GSSAPI is not a supported authentication mechanism"
    );
}

#[tokio::test]
async fn test_preauth_greeting() {
    let addr = spawn_server(true).await;
    let (mut client, greeting) = Client::connect(addr).await;

    assert_eq!(greeting, "* PREAUTH IMAP4rev1 server ready");

    // No LOGIN needed.
    client.send("A1 SELECT INBOX").await;
    let lines = client.until_tagged("A1").await;
    assert_eq!(lines.last().unwrap(), "A1 OK [READ-WRITE] SELECT Completed");
}

#[tokio::test]
async fn test_capability() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    client.send("A1 CAPABILITY").await;
    assert_eq!(client.line().await, "* CAPABILITY IMAP4rev1 AUTH=PLAIN");
    assert_eq!(client.line().await, "A1 OK CAPABILITY Completed");
}

#[tokio::test]
async fn test_state_preconditions() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    client.send("A1 SELECT INBOX").await;
    assert_eq!(client.line().await, "A1 BAD command not valid in this state");

    client.login().await;

    client.send("A2 FETCH 1 FLAGS").await;
    assert_eq!(client.line().await, "A2 BAD command not valid in this state");
}

#[tokio::test]
async fn test_create_and_list() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A2 CREATE work").await;
    assert_eq!(client.line().await, "A2 OK CREATE Completed");

    client.send("A2b CREATE work").await;
    assert!(client.line().await.starts_with("A2b NO "));

    client.send("A3 LIST \"\" \"*\"").await;
    let lines = client.until_tagged("A3").await;
    assert!(lines.contains(&"* LIST () \"/\" \"INBOX\"".to_owned()));
    assert!(lines.contains(&"* LIST () \"/\" \"work\"".to_owned()));
    assert_eq!(lines.last().unwrap(), "A3 OK LIST Completed");

    // The empty query names the hierarchy root.
    client.send("A4 LIST \"\" \"\"").await;
    assert_eq!(client.line().await, "* LIST (\\Noselect) \"/\" \"\"");
    assert_eq!(client.line().await, "A4 OK LIST Completed");

    // Exact-name query.
    client.send("A5 LIST \"\" \"work\"").await;
    assert_eq!(client.line().await, "* LIST () \"/\" \"work\"");
    assert_eq!(client.line().await, "A5 OK LIST Completed");

    client.send("A6 LSUB \"\" \"*\"").await;
    let lines = client.until_tagged("A6").await;
    assert!(lines.contains(&"* LSUB () \"/\" \"work\"".to_owned()));
}

#[tokio::test]
async fn test_select_empty_mailbox() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A2 CREATE work").await;
    client.line().await;

    client.send("A4 SELECT work").await;
    assert_eq!(client.line().await, "* 0 EXISTS");
    assert_eq!(client.line().await, "* 0 RECENT");
    assert_eq!(
        client.line().await,
        "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)"
    );
    assert_eq!(client.line().await, "* OK [UNSEEN 0]");
    assert_eq!(
        client.line().await,
        "* OK [PERMANENTFLAGS (\\Seen \\Deleted)]"
    );
    assert_eq!(client.line().await, "* OK [UIDNEXT 1]");
    assert!(client.line().await.starts_with("* OK [UIDVALIDITY "));
    assert_eq!(client.line().await, "A4 OK [READ-WRITE] SELECT Completed");
}

#[tokio::test]
async fn test_examine_is_read_only() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A2 EXAMINE INBOX").await;
    let lines = client.until_tagged("A2").await;
    assert!(lines.contains(&"* OK [PERMANENTFLAGS ()]".to_owned()));
    assert_eq!(
        lines.last().unwrap(),
        "A2 OK [READ-ONLY] EXAMINE Completed"
    );

    client.send("A3 STORE 1 +FLAGS (\\Seen)").await;
    assert_eq!(client.line().await, "A3 NO mailbox is read-only");
}

#[tokio::test]
async fn test_append_status_fetch_store() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A2 CREATE work").await;
    client.line().await;
    client.send("A4 SELECT work").await;
    client.until_tagged("A4").await;

    // APPEND with a literal body.
    client.send(&format!("A5 APPEND work {{{}}}", MAIL.len())).await;
    assert_eq!(client.line().await, "+");
    client.send_raw(MAIL.as_bytes()).await;
    client.send_raw(b"\r\n").await;
    assert_eq!(client.line().await, "A5 OK APPEND Completed");

    client.send("A6 STATUS work (MESSAGES UIDNEXT)").await;
    assert_eq!(client.line().await, "* STATUS work (MESSAGES 1 UIDNEXT 2)");
    assert_eq!(client.line().await, "A6 OK STATUS Completed");

    // Peek at the subject; `\Seen` must not be set.
    client
        .send("A7 FETCH 1 (FLAGS RFC822.SIZE BODY.PEEK[HEADER.FIELDS (SUBJECT)])")
        .await;
    assert_eq!(
        client.line().await,
        format!(
            "* 1 FETCH (FLAGS (\\Recent) RFC822.SIZE {} BODY[HEADER.FIELDS (SUBJECT)] {{13}}",
            MAIL.len()
        )
    );
    assert_eq!(client.line().await, "Subject: hi");
    assert_eq!(client.line().await, ")");
    assert_eq!(client.line().await, "A7 OK FETCH Completed");

    // Adding `\Seen` answers with the updated flags; repeating it is
    // idempotent.
    for tag in ["A8", "A9"] {
        client.send(&format!("{tag} STORE 1 +FLAGS (\\Seen)")).await;
        assert_eq!(client.line().await, "* 1 FETCH (FLAGS (\\Recent \\Seen))");
        assert_eq!(client.line().await, format!("{tag} OK STORE Completed"));
    }
}

#[tokio::test]
async fn test_fetch_body_sets_seen_and_peek_does_not() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A1 SELECT INBOX").await;
    client.until_tagged("A1").await;

    client.send(&format!("A2 APPEND INBOX {{{}}}", MAIL.len())).await;
    assert_eq!(client.line().await, "+");
    client.send_raw(MAIL.as_bytes()).await;
    client.send_raw(b"\r\n").await;
    client.line().await;

    // Peek leaves flags alone.
    client.send("A3 FETCH 1 BODY.PEEK[]").await;
    client.until_tagged("A3").await;
    client.send("A4 FETCH 1 FLAGS").await;
    assert_eq!(client.line().await, "* 1 FETCH (FLAGS (\\Recent))");
    client.line().await;

    // A non-peek body fetch sets `\Seen`.
    client.send("A5 FETCH 1 BODY[TEXT]").await;
    let lines = client.until_tagged("A5").await;
    assert_eq!(lines[0], "* 1 FETCH (BODY[TEXT] {7}");

    client.send("A6 FETCH 1 FLAGS").await;
    assert_eq!(client.line().await, "* 1 FETCH (FLAGS (\\Recent \\Seen))");
}

#[tokio::test]
async fn test_append_round_trips_body() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A1 SELECT INBOX").await;
    client.until_tagged("A1").await;

    client.send(&format!("A2 APPEND INBOX {{{}}}", MAIL.len())).await;
    assert_eq!(client.line().await, "+");
    client.send_raw(MAIL.as_bytes()).await;
    client.send_raw(b"\r\n").await;
    client.line().await;

    client.send("A3 UID FETCH 1 BODY[]").await;
    assert_eq!(
        client.line().await,
        format!("* 1 FETCH (BODY[] {{{}}}", MAIL.len())
    );
    assert_eq!(client.line().await, "Subject: hi");
    assert_eq!(client.line().await, "");
    assert_eq!(client.line().await, "body!");
    // The UID is always included in UID FETCH responses.
    assert_eq!(client.line().await, " UID 1)");
    assert_eq!(client.line().await, "A3 OK UID FETCH Completed");
}

#[tokio::test]
async fn test_uid_fetch_and_store() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A1 SELECT INBOX").await;
    client.until_tagged("A1").await;

    for tag in ["A2", "A3", "A4"] {
        client.send(&format!("{tag} APPEND INBOX {{{}}}", MAIL.len())).await;
        assert_eq!(client.line().await, "+");
        client.send_raw(MAIL.as_bytes()).await;
        client.send_raw(b"\r\n").await;
        client.line().await;
    }

    client.send("A5 UID FETCH 2:* (FLAGS)").await;
    assert_eq!(client.line().await, "* 2 FETCH (FLAGS (\\Recent) UID 2)");
    assert_eq!(client.line().await, "* 3 FETCH (FLAGS (\\Recent) UID 3)");
    assert_eq!(client.line().await, "A5 OK UID FETCH Completed");

    client.send("A6 UID STORE 3 +FLAGS (\\Deleted)").await;
    assert_eq!(
        client.line().await,
        "* 3 FETCH (FLAGS (\\Recent \\Deleted) UID 3)"
    );
    assert_eq!(client.line().await, "A6 OK UID STORE Completed");
}

#[tokio::test]
async fn test_store_silent_and_replace() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A1 SELECT INBOX").await;
    client.until_tagged("A1").await;

    client.send(&format!("A2 APPEND INBOX {{{}}}", MAIL.len())).await;
    assert_eq!(client.line().await, "+");
    client.send_raw(MAIL.as_bytes()).await;
    client.send_raw(b"\r\n").await;
    client.line().await;

    // Silent: no untagged response.
    client.send("A3 STORE 1 +FLAGS.SILENT (\\Flagged)").await;
    assert_eq!(client.line().await, "A3 OK STORE Completed");

    // Replace drops everything but the server-managed `\Recent`.
    client.send("A4 STORE 1 FLAGS (\\Draft)").await;
    assert_eq!(client.line().await, "* 1 FETCH (FLAGS (\\Recent \\Draft))");
    client.line().await;

    // Clients cannot store `\Recent` itself.
    client.send("A5 STORE 1 -FLAGS (\\Recent)").await;
    assert_eq!(client.line().await, "* 1 FETCH (FLAGS (\\Recent \\Draft))");
}

#[tokio::test]
async fn test_copy_and_expunge() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A1 CREATE work").await;
    client.line().await;
    client.send("A2 SELECT INBOX").await;
    client.until_tagged("A2").await;

    for tag in ["A3", "A4", "A5"] {
        client.send(&format!("{tag} APPEND INBOX {{{}}}", MAIL.len())).await;
        assert_eq!(client.line().await, "+");
        client.send_raw(MAIL.as_bytes()).await;
        client.send_raw(b"\r\n").await;
        client.line().await;
    }

    client.send("A6 COPY 1:2 work").await;
    assert_eq!(client.line().await, "A6 OK COPY Completed");
    client.send("A7 STATUS work (MESSAGES)").await;
    assert_eq!(client.line().await, "* STATUS work (MESSAGES 2)");
    client.line().await;

    // COPY into a missing mailbox copies nothing.
    client.send("A8 COPY 1 missing").await;
    assert!(client.line().await.starts_with("A8 NO "));

    // Delete messages 1 and 3; EXPUNGE reports highest first.
    client.send("A9 STORE 1,3 +FLAGS.SILENT (\\Deleted)").await;
    client.line().await;
    client.send("A10 EXPUNGE").await;
    assert_eq!(client.line().await, "* 3 EXPUNGE");
    assert_eq!(client.line().await, "* 1 EXPUNGE");
    assert_eq!(client.line().await, "A10 OK EXPUNGE Completed");

    // Survivor kept its UID; sequence numbers renumbered.
    client.send("A11 FETCH 1 UID").await;
    assert_eq!(client.line().await, "* 1 FETCH (UID 2)");
}

#[tokio::test]
async fn test_search() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A1 SELECT INBOX").await;
    client.until_tagged("A1").await;

    for tag in ["A2", "A3"] {
        client.send(&format!("{tag} APPEND INBOX {{{}}}", MAIL.len())).await;
        assert_eq!(client.line().await, "+");
        client.send_raw(MAIL.as_bytes()).await;
        client.send_raw(b"\r\n").await;
        client.line().await;
    }
    client.send("A4 STORE 1 +FLAGS.SILENT (\\Seen)").await;
    client.line().await;

    client.send("A5 SEARCH UNSEEN").await;
    assert_eq!(client.line().await, "* SEARCH 2");
    assert_eq!(client.line().await, "A5 OK SEARCH Completed");

    client.send("A6 UID SEARCH HEADER Subject hi").await;
    assert_eq!(client.line().await, "* SEARCH 1 2");
    assert_eq!(client.line().await, "A6 OK UID SEARCH Completed");

    client.send("A7 SEARCH LARGER 1000").await;
    assert_eq!(client.line().await, "* SEARCH");
    client.line().await;

    // Parsed but unsupported keys answer NO.
    client.send("A8 SEARCH SENTON 1-Feb-2023").await;
    assert_eq!(client.line().await, "A8 NO search key SENTON is not implemented");

    client.send("A9 SEARCH OR SEEN DELETED").await;
    assert_eq!(client.line().await, "* SEARCH 1");
    client.line().await;
}

#[tokio::test]
async fn test_close_expunges_silently() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A1 SELECT INBOX").await;
    client.until_tagged("A1").await;

    client.send(&format!("A2 APPEND INBOX {{{}}}", MAIL.len())).await;
    assert_eq!(client.line().await, "+");
    client.send_raw(MAIL.as_bytes()).await;
    client.send_raw(b"\r\n").await;
    client.line().await;

    client.send("A3 STORE 1 +FLAGS.SILENT (\\Deleted)").await;
    client.line().await;

    // No untagged EXPUNGE responses on CLOSE.
    client.send("A4 CLOSE").await;
    assert_eq!(client.line().await, "A4 OK CLOSE Completed");

    client.send("A5 STATUS INBOX (MESSAGES)").await;
    assert_eq!(client.line().await, "* STATUS INBOX (MESSAGES 0)");
}

#[tokio::test]
async fn test_oversized_append_is_refused_in_sync() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    // No continuation request: the client never sends the octets.
    client.send("A1 APPEND INBOX {10485761}").await;
    assert_eq!(client.line().await, "A1 NO message body is too big");

    // The stream is still aligned on a command boundary.
    client.send("A2 NOOP").await;
    assert_eq!(client.line().await, "A2 OK NOOP Completed");
}

#[tokio::test]
async fn test_parse_error_answers_bad_and_closes() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    client.send("A1 (").await;
    assert!(client.line().await.starts_with("A1 BAD "));
    assert!(client.closed().await);
}

#[tokio::test]
async fn test_unknown_command_keeps_session() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    client.send("A1 XFROBNICATE now").await;
    assert_eq!(client.line().await, "A1 BAD unknown command XFROBNICATE");

    client.send("A2 NOOP").await;
    assert_eq!(client.line().await, "A2 OK NOOP Completed");
}

#[tokio::test]
async fn test_recent_is_claimed_by_first_session() {
    let addr = spawn_server(false).await;

    let (mut first, _) = Client::connect(addr).await;
    first.login().await;
    first.send("A1 SELECT INBOX").await;
    first.until_tagged("A1").await;

    first.send(&format!("A2 APPEND INBOX {{{}}}", MAIL.len())).await;
    assert_eq!(first.line().await, "+");
    first.send_raw(MAIL.as_bytes()).await;
    first.send_raw(b"\r\n").await;
    first.line().await;

    // The first selecting session claims the message as recent ...
    let (mut second, _) = Client::connect(addr).await;
    second.login().await;
    second.send("B1 SELECT INBOX").await;
    let lines = second.until_tagged("B1").await;
    assert!(lines.contains(&"* 1 RECENT".to_owned()));
    second.send("B2 FETCH 1 FLAGS").await;
    assert_eq!(second.line().await, "* 1 FETCH (FLAGS (\\Recent))");
    second.line().await;

    // ... and later sessions see none.
    let (mut third, _) = Client::connect(addr).await;
    third.login().await;
    third.send("C1 SELECT INBOX").await;
    let lines = third.until_tagged("C1").await;
    assert!(lines.contains(&"* 0 RECENT".to_owned()));
}

#[tokio::test]
async fn test_starttls_without_tls_material() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    client.send("A1 STARTTLS").await;
    assert_eq!(client.line().await, "A1 NO TLS is not available");

    client.send("A2 NOOP").await;
    assert_eq!(client.line().await, "A2 OK NOOP Completed");
}

#[tokio::test]
async fn test_logout() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;

    client.send("A1 LOGOUT").await;
    assert_eq!(client.line().await, "* BYE IMAP4rev1 Server logging out");
    assert_eq!(client.line().await, "A1 OK LOGOUT Completed");
    assert!(client.closed().await);
}

#[tokio::test]
async fn test_rename_and_delete_mailbox() {
    let addr = spawn_server(false).await;
    let (mut client, _) = Client::connect(addr).await;
    client.login().await;

    client.send("A1 CREATE work").await;
    client.line().await;

    client.send("A2 RENAME work play").await;
    assert_eq!(client.line().await, "A2 OK RENAME Completed");

    client.send("A3 DELETE play").await;
    assert_eq!(client.line().await, "A3 OK DELETE Completed");

    client.send("A4 DELETE INBOX").await;
    assert_eq!(client.line().await, "A4 NO INBOX may not be deleted");

    client.send("A5 SELECT play").await;
    assert!(client.line().await.starts_with("A5 NO "));
}
