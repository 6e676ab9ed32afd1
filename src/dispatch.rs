//! Command dispatch: from a decoded [`Command`] to store operations and
//! typed responses.
//!
//! Dispatch is an exhaustive match: every command checks its state-machine
//! precondition, validates arguments, talks to the store, and assembles
//! responses. Untagged data always precedes the tagged completion of the
//! command that caused it. Store failures answer `NO`; protocol misuse
//! answers `BAD`; the session survives both.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use mailhouse_imap::auth::{AuthMechanism, AuthenticateData};
use mailhouse_imap::command::{Command, CommandBody};
use mailhouse_imap::core::{AString, Tag};
use mailhouse_imap::datetime::DateTime;
use mailhouse_imap::fetch::{MessageDataItem, MessageDataItemName};
use mailhouse_imap::flag::{Flag, FlagNameAttribute, StoreResponse, StoreType};
use mailhouse_imap::mailbox::{ListMailbox, Mailbox};
use mailhouse_imap::response::{Capability, Code, Data, Response, Status};
use mailhouse_imap::sequence::SequenceSet;
use mailhouse_imap::status::{StatusDataItem, StatusDataItemName};

use crate::config::Config;
use crate::fetch::{assemble, nz, resolve, session_flags};
use crate::session::{SelectedMailbox, SessionState};
use crate::store::search::compile;
use crate::store::{MessageStore, Result as StoreResult};

/// What the connection loop must do after the responses are flushed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Control {
    None,
    /// Wrap the stream in TLS; the `OK` has already been sent.
    StartTls,
    /// Switch the codec to authenticate-data mode; a continuation request
    /// has already been sent.
    ExpectAuthData,
}

/// The outcome of dispatching one command.
#[derive(Debug)]
pub struct Handled {
    pub responses: Vec<Response>,
    pub control: Control,
}

impl Handled {
    fn respond(responses: Vec<Response>) -> Self {
        Self {
            responses,
            control: Control::None,
        }
    }

    fn one(response: Response) -> Self {
        Self::respond(vec![response])
    }
}

fn ok(tag: Tag, name: &str) -> Response {
    Response::Status(Status::completed(tag, name))
}

fn no(tag: Tag, text: impl Into<String>) -> Response {
    Response::Status(Status::no(Some(tag), text))
}

fn bad(tag: Tag, text: impl Into<String>) -> Response {
    Response::Status(Status::bad(Some(tag), text))
}

/// One connection's command processor.
pub struct Session {
    state: SessionState,
    store: Arc<dyn MessageStore>,
    config: Arc<Config>,
    /// TLS material is configured, so `STARTTLS` can be offered.
    tls_available: bool,
    /// The tag of an `AUTHENTICATE` awaiting its continuation line.
    pending_auth: Option<Tag>,
}

impl Session {
    pub fn new(store: Arc<dyn MessageStore>, config: Arc<Config>, tls_available: bool) -> Self {
        let state = if config.no_auth {
            SessionState::Authenticated
        } else {
            SessionState::NotAuthenticated
        };

        Self {
            state,
            store,
            config,
            tls_available,
            pending_auth: None,
        }
    }

    /// False once `LOGOUT` was processed.
    pub fn ready(&self) -> bool {
        self.state.ready()
    }

    /// The tag of an in-flight `AUTHENTICATE`, taken when the exchange is
    /// aborted by a transport-level error.
    pub fn take_pending_auth(&mut self) -> Option<Tag> {
        self.pending_auth.take()
    }

    /// The stream is now TLS; stop offering (and accepting) `STARTTLS`.
    pub fn tls_established(&mut self) {
        self.tls_available = false;
    }

    pub async fn handle(&mut self, command: Command) -> Handled {
        let Command { tag, body } = command;

        if !self.state.permits(&body) {
            return Handled::one(bad(tag, "command not valid in this state"));
        }

        match body {
            CommandBody::Capability => self.capability(tag),
            CommandBody::Noop => Handled::one(ok(tag, "NOOP")),
            CommandBody::Logout => self.logout(tag),
            CommandBody::Login { username, password } => self.login(tag, username, password),
            CommandBody::Authenticate {
                mechanism,
                initial_response,
            } => self.authenticate(tag, mechanism, initial_response),
            CommandBody::StartTls => self.starttls(tag),
            CommandBody::Select { mailbox } => self.select(tag, mailbox, false).await,
            CommandBody::Examine { mailbox } => self.select(tag, mailbox, true).await,
            CommandBody::Create { mailbox } => self.create(tag, mailbox).await,
            CommandBody::Delete { mailbox } => self.delete(tag, mailbox).await,
            CommandBody::Rename { from, to } => self.rename(tag, from, to).await,
            CommandBody::Subscribe { .. } => Handled::one(ok(tag, "SUBSCRIBE")),
            CommandBody::Unsubscribe { .. } => Handled::one(ok(tag, "UNSUBSCRIBE")),
            CommandBody::List {
                mailbox_wildcard, ..
            } => self.list(tag, mailbox_wildcard, false).await,
            CommandBody::Lsub {
                mailbox_wildcard, ..
            } => self.list(tag, mailbox_wildcard, true).await,
            CommandBody::Status { mailbox, items } => self.status(tag, mailbox, items).await,
            CommandBody::Append {
                mailbox,
                flags,
                date,
                message,
            } => self.append(tag, mailbox, flags, date, message.into_bytes()).await,
            CommandBody::Check => self.check(tag).await,
            CommandBody::Close => self.close(tag).await,
            CommandBody::Expunge => self.expunge(tag).await,
            CommandBody::Fetch {
                sequence_set,
                attributes,
                uid,
            } => self.fetch(tag, sequence_set, attributes.expand(), uid).await,
            CommandBody::Store {
                sequence_set,
                kind,
                response,
                flags,
                uid,
            } => self.store(tag, sequence_set, kind, response, flags, uid).await,
            CommandBody::Copy {
                sequence_set,
                mailbox,
                uid,
            } => self.copy(tag, sequence_set, mailbox, uid).await,
            CommandBody::Search {
                charset,
                criteria,
                uid,
            } => self.search(tag, charset, criteria, uid).await,
            CommandBody::Unknown { keyword } => {
                debug!("unknown command {keyword}");
                Handled::one(bad(tag, format!("unknown command {keyword}")))
            }
        }
    }

    // -- connection-level --

    fn capability(&self, tag: Tag) -> Handled {
        let mut capabilities = vec![Capability::Imap4Rev1];
        if self.tls_available {
            capabilities.push(Capability::StartTls);
        }
        if !self.config.no_auth {
            capabilities.push(Capability::AuthPlain);
        }

        Handled::respond(vec![
            Response::Data(Data::Capability(capabilities)),
            ok(tag, "CAPABILITY"),
        ])
    }

    fn logout(&mut self, tag: Tag) -> Handled {
        self.state = SessionState::Logout;

        Handled::respond(vec![
            Response::Status(Status::bye("IMAP4rev1 Server logging out")),
            ok(tag, "LOGOUT"),
        ])
    }

    fn login(&mut self, tag: Tag, username: AString, password: AString) -> Handled {
        if self.verify_credentials(&username.to_text(), &password.to_text()) {
            self.state = SessionState::Authenticated;
            Handled::one(ok(tag, "LOGIN"))
        } else {
            Handled::one(no(tag, "invalid credentials"))
        }
    }

    fn authenticate(
        &mut self,
        tag: Tag,
        mechanism: AuthMechanism,
        initial_response: Option<Vec<u8>>,
    ) -> Handled {
        if mechanism != AuthMechanism::Plain {
            return Handled::one(no(
                tag,
                format!("{mechanism} is not a supported authentication mechanism"),
            ));
        }

        match initial_response {
            // SASL-IR: the whole exchange fits in the command line.
            Some(data) => self.authenticate_plain(tag, &data),
            None => {
                self.pending_auth = Some(tag);
                Handled {
                    responses: vec![Response::Continue],
                    control: Control::ExpectAuthData,
                }
            }
        }
    }

    /// The continuation line following `AUTHENTICATE`.
    pub async fn handle_auth_data(&mut self, data: AuthenticateData) -> Handled {
        let Some(tag) = self.pending_auth.take() else {
            return Handled::one(Response::Status(Status::bad(
                None,
                "no authentication in progress",
            )));
        };

        match data {
            AuthenticateData::Continue(data) => self.authenticate_plain(tag, &data),
            AuthenticateData::Cancel => Handled::one(bad(tag, "AUTHENTICATE cancelled")),
        }
    }

    /// RFC 4616: `[authzid] \0 authcid \0 password`.
    fn authenticate_plain(&mut self, tag: Tag, data: &[u8]) -> Handled {
        let mut parts = data.split(|byte| *byte == 0);
        let (Some(_authzid), Some(authcid), Some(password)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Handled::one(bad(tag, "malformed PLAIN response"));
        };

        let authcid = String::from_utf8_lossy(authcid);
        let password = String::from_utf8_lossy(password);

        if self.verify_credentials(&authcid, &password) {
            self.state = SessionState::Authenticated;
            Handled::one(ok(tag, "AUTHENTICATE"))
        } else {
            Handled::one(no(tag, "invalid credentials"))
        }
    }

    fn verify_credentials(&self, username: &str, password: &str) -> bool {
        match (&self.config.user_name, &self.config.user_password) {
            (Some(expected_user), Some(expected_password)) => {
                username == expected_user && password == expected_password
            }
            _ => false,
        }
    }

    fn starttls(&mut self, tag: Tag) -> Handled {
        if self.tls_available {
            Handled {
                responses: vec![Response::Status(Status::ok(
                    Some(tag),
                    None,
                    "Begin TLS negotiation now",
                ))],
                control: Control::StartTls,
            }
        } else {
            Handled::one(no(tag, "TLS is not available"))
        }
    }

    // -- mailbox administration --

    async fn create(&mut self, tag: Tag, mailbox: Mailbox) -> Handled {
        match self.store.create_mailbox(mailbox.as_str()).await {
            Ok(_) => Handled::one(ok(tag, "CREATE")),
            Err(err) => Handled::one(no(tag, err.to_string())),
        }
    }

    async fn delete(&mut self, tag: Tag, mailbox: Mailbox) -> Handled {
        if mailbox.as_str() == "INBOX" {
            return Handled::one(no(tag, "INBOX may not be deleted"));
        }

        match self.store.delete_mailbox(mailbox.as_str()).await {
            Ok(()) => Handled::one(ok(tag, "DELETE")),
            Err(err) => Handled::one(no(tag, err.to_string())),
        }
    }

    async fn rename(&mut self, tag: Tag, from: Mailbox, to: Mailbox) -> Handled {
        match self
            .store
            .rename_mailbox(from.as_str(), to.as_str())
            .await
        {
            Ok(()) => Handled::one(ok(tag, "RENAME")),
            Err(err) => Handled::one(no(tag, err.to_string())),
        }
    }

    async fn list(&mut self, tag: Tag, query: ListMailbox, lsub: bool) -> Handled {
        let keyword = if lsub { "LSUB" } else { "LIST" };
        let query = query.to_text();

        let line = |attributes, mailbox| {
            if lsub {
                Response::Data(Data::Lsub {
                    attributes,
                    delimiter: Some('/'),
                    mailbox,
                })
            } else {
                Response::Data(Data::List {
                    attributes,
                    delimiter: Some('/'),
                    mailbox,
                })
            }
        };

        // The empty query names the hierarchy root.
        if query.is_empty() {
            return Handled::respond(vec![
                line(vec![FlagNameAttribute::Noselect], Mailbox::new("")),
                ok(tag, keyword),
            ]);
        }

        let mailboxes = match self.store.list_mailboxes().await {
            Ok(mailboxes) => mailboxes,
            Err(err) => return Handled::one(no(tag, err.to_string())),
        };

        // `%` is treated like `*` (whole set); a query without wildcards
        // is an exact-name filter.
        let wildcard = query.contains('%') || query.contains('*');
        let mut responses = Vec::new();
        for mailbox in mailboxes {
            if wildcard || mailbox.name == query {
                responses.push(line(Vec::new(), Mailbox::new(mailbox.name)));
            }
        }
        responses.push(ok(tag, keyword));

        Handled::respond(responses)
    }

    async fn status(
        &mut self,
        tag: Tag,
        mailbox: Mailbox,
        names: Vec<StatusDataItemName>,
    ) -> Handled {
        match self.status_items(&mailbox, &names).await {
            Ok(items) => Handled::respond(vec![
                Response::Data(Data::Status { mailbox, items }),
                ok(tag, "STATUS"),
            ]),
            Err(err) => Handled::one(no(tag, err.to_string())),
        }
    }

    async fn status_items(
        &self,
        mailbox: &Mailbox,
        names: &[StatusDataItemName],
    ) -> StoreResult<Vec<StatusDataItem>> {
        let name = mailbox.as_str();
        let record = self.store.mailbox_by_name(name).await?;

        // Requested order is echoed back.
        let mut items = Vec::with_capacity(names.len());
        for item in names {
            items.push(match item {
                StatusDataItemName::Messages => {
                    StatusDataItem::Messages(self.store.message_count(name).await?)
                }
                StatusDataItemName::Recent => {
                    StatusDataItem::Recent(self.store.recent_count(name).await?)
                }
                StatusDataItemName::UidNext => StatusDataItem::UidNext(nz(record.next_uid)),
                StatusDataItemName::UidValidity => {
                    StatusDataItem::UidValidity(nz(record.id))
                }
                StatusDataItemName::Unseen => {
                    StatusDataItem::Unseen(self.store.unseen_count(name).await?)
                }
            });
        }

        Ok(items)
    }

    // -- selection --

    async fn select(&mut self, tag: Tag, mailbox: Mailbox, read_only: bool) -> Handled {
        let name = mailbox.as_str();

        let outcome = async {
            let record = self.store.mailbox_by_name(name).await?;
            let exists = self.store.message_count(name).await?;
            let unseen = self.store.unseen_count(name).await?;

            // A read-write SELECT claims `\Recent` for this session;
            // EXAMINE only observes it.
            let (recent, claimed) = if read_only {
                (self.store.recent_count(name).await?, HashSet::new())
            } else {
                let claimed = self.store.claim_recent(name).await?;
                (claimed.len() as u32, claimed.into_iter().collect())
            };

            Ok::<_, crate::store::StoreError>((record, exists, unseen, recent, claimed))
        }
        .await;

        let (record, exists, unseen, recent, claimed) = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                // A failed SELECT leaves no mailbox selected.
                if self.state.selected().is_some() {
                    self.state = SessionState::Authenticated;
                }
                return Handled::one(no(tag, err.to_string()));
            }
        };

        let permanent_flags = if read_only {
            Vec::new()
        } else {
            vec![Flag::Seen, Flag::Deleted]
        };
        let (mode, name_of) = if read_only {
            (Code::ReadOnly, "EXAMINE")
        } else {
            (Code::ReadWrite, "SELECT")
        };

        let responses = vec![
            Response::Data(Data::Exists(exists)),
            Response::Data(Data::Recent(recent)),
            Response::Data(Data::Flags(Flag::advertised().to_vec())),
            Response::Status(Status::ok(None, Some(Code::Unseen(unseen)), "")),
            Response::Status(Status::ok(
                None,
                Some(Code::PermanentFlags(permanent_flags)),
                "",
            )),
            Response::Status(Status::ok(None, Some(Code::UidNext(nz(record.next_uid))), "")),
            Response::Status(Status::ok(None, Some(Code::UidValidity(nz(record.id))), "")),
            Response::Status(Status::ok(
                Some(tag),
                Some(mode),
                format!("{name_of} Completed"),
            )),
        ];

        self.state = SessionState::Selected(SelectedMailbox {
            mailbox: record,
            read_only,
            recent: claimed,
        });

        Handled::respond(responses)
    }

    async fn close(&mut self, tag: Tag) -> Handled {
        let Some(selected) = self.state.selected() else {
            return Handled::one(bad(tag, "command not valid in this state"));
        };

        // CLOSE expunges silently in read-write mode.
        if !selected.read_only {
            if let Err(err) = self.store.expunge(selected.name()).await {
                return Handled::one(no(tag, err.to_string()));
            }
        }

        self.state = SessionState::Authenticated;
        Handled::one(ok(tag, "CLOSE"))
    }

    async fn check(&mut self, tag: Tag) -> Handled {
        match self.store.sync().await {
            Ok(()) => Handled::one(ok(tag, "CHECK")),
            Err(err) => Handled::one(no(tag, err.to_string())),
        }
    }

    // -- message operations --

    async fn append(
        &mut self,
        tag: Tag,
        mailbox: Mailbox,
        flags: Vec<Flag>,
        date: Option<DateTime>,
        message: Vec<u8>,
    ) -> Handled {
        // `\Recent` is server-managed: strip it from the client's list,
        // then grant it to the new message.
        let mut flags: Vec<Flag> = flags
            .into_iter()
            .filter(|flag| *flag != Flag::Recent)
            .collect();
        flags.push(Flag::Recent);

        let created = date.map(|date| *date.inner());

        match self
            .store
            .create_message(mailbox.as_str(), &message, &flags, created)
            .await
        {
            Ok(_) => Handled::one(ok(tag, "APPEND")),
            Err(err) => Handled::one(no(tag, err.to_string())),
        }
    }

    async fn expunge(&mut self, tag: Tag) -> Handled {
        let Some(selected) = self.state.selected() else {
            return Handled::one(bad(tag, "command not valid in this state"));
        };
        if selected.read_only {
            return Handled::one(no(tag, "mailbox is read-only"));
        }

        let name = selected.name().to_owned();
        let outcome = async {
            let before = self.store.uids(&name).await?;
            let expunged = self.store.expunge(&name).await?;
            Ok::<_, crate::store::StoreError>((before, expunged))
        }
        .await;

        let (before, expunged) = match outcome {
            Ok(outcome) => outcome,
            Err(err) => return Handled::one(no(tag, err.to_string())),
        };

        // Victims are reported by pre-deletion sequence number, highest
        // first, so earlier numbers stay valid while the client applies
        // them one by one.
        let mut responses = Vec::new();
        for uid in expunged.iter().rev() {
            if let Ok(index) = before.binary_search(uid) {
                responses.push(Response::Data(Data::Expunge(nz(index as u32 + 1))));
            }
        }
        responses.push(ok(tag, "EXPUNGE"));

        Handled::respond(responses)
    }

    async fn fetch(
        &mut self,
        tag: Tag,
        sequence_set: SequenceSet,
        names: Vec<MessageDataItemName>,
        uid_mode: bool,
    ) -> Handled {
        let Some(selected) = self.state.selected().cloned() else {
            return Handled::one(bad(tag, "command not valid in this state"));
        };
        let completed_as = if uid_mode { "UID FETCH" } else { "FETCH" };

        let resolved = match resolve(&self.store, selected.name(), &sequence_set, uid_mode).await
        {
            Ok(resolved) => resolved,
            Err(err) => return Handled::one(no(tag, err.to_string())),
        };

        let mut responses = Vec::new();
        for numbered in resolved {
            let message = &numbered.message;

            let assembled = match assemble(&self.store, &selected, message, &names).await {
                Ok(assembled) => assembled,
                Err(err) => return Handled::one(no(tag, err.to_string())),
            };

            let mut items = assembled.items;
            if uid_mode
                && !items
                    .iter()
                    .any(|item| matches!(item, MessageDataItem::Uid(_)))
            {
                items.push(MessageDataItem::Uid(nz(message.uid)));
            }

            // The reply reflects the flags before this fetch marked the
            // message seen.
            if assembled.set_seen
                && !selected.read_only
                && !message.has_flag(&Flag::Seen)
            {
                if let Err(err) = self.store.add_flags(message.row_id, &[Flag::Seen]).await {
                    return Handled::one(no(tag, err.to_string()));
                }
            }

            responses.push(Response::Data(Data::Fetch {
                seq: numbered.seq,
                items,
            }));
        }
        responses.push(ok(tag, completed_as));

        Handled::respond(responses)
    }

    async fn store(
        &mut self,
        tag: Tag,
        sequence_set: SequenceSet,
        kind: StoreType,
        response: StoreResponse,
        flags: Vec<Flag>,
        uid_mode: bool,
    ) -> Handled {
        let Some(selected) = self.state.selected().cloned() else {
            return Handled::one(bad(tag, "command not valid in this state"));
        };
        let completed_as = if uid_mode { "UID STORE" } else { "STORE" };

        if selected.read_only {
            return Handled::one(no(tag, "mailbox is read-only"));
        }

        // `\Recent` is server-managed and never stored on client request.
        let flags: Vec<Flag> = flags
            .into_iter()
            .filter(|flag| *flag != Flag::Recent)
            .collect();

        let resolved = match resolve(&self.store, selected.name(), &sequence_set, uid_mode).await
        {
            Ok(resolved) => resolved,
            Err(err) => return Handled::one(no(tag, err.to_string())),
        };

        let mut responses = Vec::new();
        for numbered in resolved {
            let message = &numbered.message;

            let result = match kind {
                StoreType::Add => self.store.add_flags(message.row_id, &flags).await,
                StoreType::Remove => self.store.remove_flags(message.row_id, &flags).await,
                StoreType::Replace => {
                    let current: Vec<Flag> = message
                        .flags
                        .iter()
                        .filter(|flag| **flag != Flag::Recent)
                        .cloned()
                        .collect();
                    self.store
                        .replace_flags(message.row_id, &current, &flags)
                        .await
                }
            };

            if let Err(err) = result {
                return Handled::one(no(tag, err.to_string()));
            }

            if response == StoreResponse::Answer {
                let updated = match self.store.message_by_row(message.row_id).await {
                    Ok(updated) => updated,
                    Err(err) => return Handled::one(no(tag, err.to_string())),
                };

                let mut items = vec![MessageDataItem::Flags(session_flags(&updated, &selected))];
                if uid_mode {
                    items.push(MessageDataItem::Uid(nz(updated.uid)));
                }

                responses.push(Response::Data(Data::Fetch {
                    seq: numbered.seq,
                    items,
                }));
            }
        }
        responses.push(ok(tag, completed_as));

        Handled::respond(responses)
    }

    async fn copy(
        &mut self,
        tag: Tag,
        sequence_set: SequenceSet,
        target: Mailbox,
        uid_mode: bool,
    ) -> Handled {
        let Some(selected) = self.state.selected() else {
            return Handled::one(bad(tag, "command not valid in this state"));
        };
        let completed_as = if uid_mode { "UID COPY" } else { "COPY" };

        let resolved =
            match resolve(&self.store, selected.name(), &sequence_set, uid_mode).await {
                Ok(resolved) => resolved,
                Err(err) => return Handled::one(no(tag, err.to_string())),
            };

        let row_ids: Vec<u64> = resolved
            .iter()
            .map(|numbered| numbered.message.row_id)
            .collect();

        match self.store.copy_messages(&row_ids, target.as_str()).await {
            Ok(_) => Handled::one(ok(tag, completed_as)),
            Err(err) => Handled::one(no(tag, err.to_string())),
        }
    }

    async fn search(
        &mut self,
        tag: Tag,
        charset: Option<String>,
        criteria: mailhouse_imap::search::SearchKey,
        uid_mode: bool,
    ) -> Handled {
        let Some(selected) = self.state.selected() else {
            return Handled::one(bad(tag, "command not valid in this state"));
        };
        let completed_as = if uid_mode { "UID SEARCH" } else { "SEARCH" };

        if let Some(charset) = charset {
            if !charset.eq_ignore_ascii_case("US-ASCII") && !charset.eq_ignore_ascii_case("UTF-8")
            {
                return Handled::one(no(tag, format!("charset {charset} is not implemented")));
            }
        }

        let query = match compile(&criteria) {
            Ok(query) => query,
            Err(err) => return Handled::one(no(tag, err.to_string())),
        };

        let name = selected.name().to_owned();
        let uids = match self.store.search(&name, &query).await {
            Ok(uids) => uids,
            Err(err) => return Handled::one(no(tag, err.to_string())),
        };

        let ids = if uid_mode {
            uids
        } else {
            // Map UIDs back to sequence numbers.
            let all = match self.store.uids(&name).await {
                Ok(all) => all,
                Err(err) => return Handled::one(no(tag, err.to_string())),
            };
            uids.iter()
                .filter_map(|uid| all.binary_search(uid).ok())
                .map(|index| index as u32 + 1)
                .collect()
        };

        Handled::respond(vec![
            Response::Data(Data::Search(ids)),
            ok(tag, completed_as),
        ])
    }
}
