use chrono::Utc;
use diesel::{dsl::not, pg::Pg, prelude::*, PgConnection};
use uuid::Uuid;

use super::{
    AttachmentSummary, DateRange, LetterKind, LetterRecord, LetterResponse, LetterStore,
    ListFilter, OwnerSummary, ValidChanges, ValidDraft,
};
use crate::{
    models::{Attachment, IncomingLetter, NewIncomingLetter},
    schema::incoming_letters,
    utils::time::to_iso,
};

#[derive(AsChangeset)]
#[diesel(table_name = incoming_letters)]
struct IncomingChangeset<'a> {
    document_date: chrono::NaiveDate,
    sender: &'a str,
    recipient: &'a str,
    subject: &'a str,
}

impl LetterRecord for IncomingLetter {
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
            kind: LetterKind::Incoming,
            reference_number: self.reference_number,
            origin_number: Some(self.origin_number),
            document_date: self.document_date,
            origin_date: Some(self.origin_date),
            sender: self.sender,
            recipient: self.recipient,
            subject: self.subject,
            owner_id: self.owner_id,
            owner,
            is_read: Some(self.is_read),
            disposed: self.disposed,
            warning: None,
            attachment: attachment.map(AttachmentSummary::from),
            registered_on: self.registered_on,
            created_at: to_iso(self.created_at),
            updated_at: to_iso(self.updated_at),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IncomingStore;

fn filtered(filter: &ListFilter) -> incoming_letters::BoxedQuery<'static, Pg> {
    let mut query = scoped(filter.owner);

    if let Some(pattern) = filter.search_pattern() {
        query = query.filter(
            incoming_letters::reference_number
                .ilike(pattern.clone())
                .or(incoming_letters::subject.ilike(pattern.clone()))
                .or(incoming_letters::sender.ilike(pattern.clone()))
                .or(incoming_letters::recipient.ilike(pattern)),
        );
    }
    if let Some(start) = filter.start {
        query = query.filter(incoming_letters::document_date.ge(start));
    }
    if let Some(end) = filter.end {
        query = query.filter(incoming_letters::document_date.le(end));
    }

    query
}

fn scoped(owner: Option<Uuid>) -> incoming_letters::BoxedQuery<'static, Pg> {
    let mut query = incoming_letters::table.into_boxed();
    if let Some(owner) = owner {
        query = query.filter(incoming_letters::owner_id.eq(owner));
    }
    query
}

impl IncomingStore {
    /// Unread letters within the caller's visibility scope.
    pub fn count_unread(&self, conn: &mut PgConnection, owner: Option<Uuid>) -> QueryResult<i64> {
        scoped(owner)
            .filter(incoming_letters::is_read.eq(false))
            .count()
            .get_result(conn)
    }
}

impl LetterStore for IncomingStore {
    type Record = IncomingLetter;

    const KIND: LetterKind = LetterKind::Incoming;

    fn find(&self, conn: &mut PgConnection, id: i64) -> QueryResult<Option<IncomingLetter>> {
        incoming_letters::table.find(id).first(conn).optional()
    }

    fn list(
        &self,
        conn: &mut PgConnection,
        filter: &ListFilter,
    ) -> QueryResult<(Vec<IncomingLetter>, i64)> {
        let total: i64 = filtered(filter).count().get_result(conn)?;
        let rows = filtered(filter)
            .order(incoming_letters::id.desc())
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
    ) -> QueryResult<Vec<IncomingLetter>> {
        scoped(owner)
            .filter(incoming_letters::document_date.between(range.start, range.end))
            .order((
                incoming_letters::document_date.asc(),
                incoming_letters::id.asc(),
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
    ) -> QueryResult<IncomingLetter> {
        let row = NewIncomingLetter {
            reference_number: draft.reference_number.clone(),
            origin_number: draft.origin_number.clone(),
            document_date: draft.document_date,
            origin_date: draft.origin_date,
            sender: draft.sender.clone(),
            recipient: draft.recipient.clone(),
            subject: draft.subject.clone(),
            owner_id: Some(owner_id),
            attachment_token: Some(token.to_string()),
            registered_on: Utc::now().date_naive(),
        };

        diesel::insert_into(incoming_letters::table)
            .values(&row)
            .get_result(conn)
    }

    fn update(
        &self,
        conn: &mut PgConnection,
        id: i64,
        changes: &ValidChanges,
    ) -> QueryResult<Option<IncomingLetter>> {
        let changeset = IncomingChangeset {
            document_date: changes.document_date,
            sender: &changes.sender,
            recipient: &changes.recipient,
            subject: &changes.subject,
        };

        diesel::update(incoming_letters::table.find(id))
            .set((
                &changeset,
                incoming_letters::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)
            .optional()
    }

    fn toggle_disposition(
        &self,
        conn: &mut PgConnection,
        id: i64,
    ) -> QueryResult<Option<IncomingLetter>> {
        diesel::update(incoming_letters::table.find(id))
            .set((
                incoming_letters::disposed.eq(not(incoming_letters::disposed)),
                incoming_letters::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)
            .optional()
    }

    fn delete(&self, conn: &mut PgConnection, id: i64) -> QueryResult<usize> {
        diesel::delete(incoming_letters::table.find(id)).execute(conn)
    }

    fn mark_read(&self, conn: &mut PgConnection, id: i64) -> QueryResult<Option<IncomingLetter>> {
        diesel::update(
            incoming_letters::table
                .find(id)
                .filter(incoming_letters::is_read.eq(false)),
        )
        .set((
            incoming_letters::is_read.eq(true),
            incoming_letters::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(conn)
        .optional()
    }
}
