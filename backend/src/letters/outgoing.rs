use chrono::Utc;
use diesel::{dsl::not, pg::Pg, prelude::*, PgConnection};
use uuid::Uuid;

use super::{
    AttachmentSummary, DateRange, LetterKind, LetterRecord, LetterResponse, LetterStore,
    ListFilter, OwnerSummary, ValidChanges, ValidDraft,
};
use crate::{
    models::{Attachment, OutgoingLetter, NewOutgoingLetter},
    schema::outgoing_letters,
    utils::time::to_iso,
};

#[derive(AsChangeset)]
#[diesel(table_name = outgoing_letters)]
struct OutgoingChangeset<'a> {
    document_date: chrono::NaiveDate,
    sender: &'a str,
    recipient: &'a str,
    subject: &'a str,
}

impl LetterRecord for OutgoingLetter {
    fn id(&self) -> i64 {
        self.id
    }

    fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }

    fn attachment_token(&self) -> Option<&str> {
        self.attachment_token.as_deref()
    }

    fn into_response(
        self,
        attachment: Option<&Attachment>,
        owner: Option<OwnerSummary>,
    ) -> LetterResponse {
        LetterResponse {
            id: self.id,
            kind: LetterKind::Outgoing,
            reference_number: self.reference_number,
            origin_number: None,
            document_date: self.document_date,
            origin_date: None,
            sender: self.sender,
            recipient: self.recipient,
            subject: self.subject,
            owner_id: self.owner_id,
            owner,
            is_read: None,
            disposed: self.disposed,
            warning: Some(self.warning),
            attachment: attachment.map(AttachmentSummary::from),
            registered_on: self.registered_on,
            created_at: to_iso(self.created_at),
            updated_at: to_iso(self.updated_at),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OutgoingStore;

fn filtered(filter: &ListFilter) -> outgoing_letters::BoxedQuery<'static, Pg> {
    let mut query = scoped(filter.owner);

    if let Some(pattern) = filter.search_pattern() {
        query = query.filter(
            outgoing_letters::reference_number
                .ilike(pattern.clone())
                .or(outgoing_letters::subject.ilike(pattern.clone()))
                .or(outgoing_letters::sender.ilike(pattern.clone()))
                .or(outgoing_letters::recipient.ilike(pattern)),
        );
    }
    if let Some(start) = filter.start {
        query = query.filter(outgoing_letters::document_date.ge(start));
    }
    if let Some(end) = filter.end {
        query = query.filter(outgoing_letters::document_date.le(end));
    }

    query
}

fn scoped(owner: Option<Uuid>) -> outgoing_letters::BoxedQuery<'static, Pg> {
    let mut query = outgoing_letters::table.into_boxed();
    if let Some(owner) = owner {
        query = query.filter(outgoing_letters::owner_id.eq(owner));
    }
    query
}

impl OutgoingStore {
    /// Flips the follow-up warning marker and nothing else.
    pub fn toggle_warning(
        &self,
        conn: &mut PgConnection,
        id: i64,
    ) -> QueryResult<Option<OutgoingLetter>> {
        diesel::update(outgoing_letters::table.find(id))
            .set((
                outgoing_letters::warning.eq(not(outgoing_letters::warning)),
                outgoing_letters::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)
            .optional()
    }
}

impl LetterStore for OutgoingStore {
    type Record = OutgoingLetter;

    const KIND: LetterKind = LetterKind::Outgoing;

    fn find(&self, conn: &mut PgConnection, id: i64) -> QueryResult<Option<OutgoingLetter>> {
        outgoing_letters::table.find(id).first(conn).optional()
    }

    fn list(
        &self,
        conn: &mut PgConnection,
        filter: &ListFilter,
    ) -> QueryResult<(Vec<OutgoingLetter>, i64)> {
        let total: i64 = filtered(filter).count().get_result(conn)?;
        let rows = filtered(filter)
            .order(outgoing_letters::id.desc())
            .limit(filter.per_page)
            .offset(filter.offset())
            .load(conn)?;
        Ok((rows, total))
    }

    fn report(
        &self,
        conn: &mut PgConnection,
        owner: Option<Uuid>,
        range: DateRange,
    ) -> QueryResult<Vec<OutgoingLetter>> {
        scoped(owner)
            .filter(outgoing_letters::document_date.between(range.start, range.end))
            .order((
                outgoing_letters::document_date.asc(),
                outgoing_letters::id.asc(),
            ))
            .load(conn)
    }

    fn count(&self, conn: &mut PgConnection, owner: Option<Uuid>) -> QueryResult<i64> {
        scoped(owner).count().get_result(conn)
    }

    fn insert(
        &self,
        conn: &mut PgConnection,
        draft: &ValidDraft,
        owner_id: Uuid,
        token: &str,
    ) -> QueryResult<OutgoingLetter> {
        let row = NewOutgoingLetter {
            reference_number: draft.reference_number.clone(),
            document_date: draft.document_date,
            sender: draft.sender.clone(),
            recipient: draft.recipient.clone(),
            subject: draft.subject.clone(),
            owner_id: Some(owner_id),
            attachment_token: Some(token.to_string()),
            registered_on: Utc::now().date_naive(),
        };

        diesel::insert_into(outgoing_letters::table)
            .values(&row)
            .get_result(conn)
    }

    fn update(
        &self,
        conn: &mut PgConnection,
        id: i64,
        changes: &ValidChanges,
    ) -> QueryResult<Option<OutgoingLetter>> {
        let changeset = OutgoingChangeset {
            document_date: changes.document_date,
            sender: &changes.sender,
            recipient: &changes.recipient,
            subject: &changes.subject,
        };

        diesel::update(outgoing_letters::table.find(id))
            .set((
                &changeset,
                outgoing_letters::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)
            .optional()
    }

    fn toggle_disposition(
        &self,
        conn: &mut PgConnection,
        id: i64,
    ) -> QueryResult<Option<OutgoingLetter>> {
        diesel::update(outgoing_letters::table.find(id))
            .set((
                outgoing_letters::disposed.eq(not(outgoing_letters::disposed)),
                outgoing_letters::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)
            .optional()
    }

    fn delete(&self, conn: &mut PgConnection, id: i64) -> QueryResult<usize> {
        diesel::delete(outgoing_letters::table.find(id)).execute(conn)
    }
}
