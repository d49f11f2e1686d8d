use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use log::debug;

use crate::{
    database::{Channel, Database},
    descriptor::{ArrayHandle, Descriptor},
    error::Error,
    handles::{info, sqlda, FreeStatementOption, StmtHandle, TrHandle, FETCH_NO_MORE_ROWS},
    transaction::{Subscription, Transaction},
    value::Value,
};

/// Lifecycle state of a [`Statement`]. The engine does not enforce call legality in-process, so
/// the statement tracks it on this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No engine-side handle exists. The only state with a zero handle.
    Deallocated,
    /// A handle exists, but nothing has been prepared on it yet.
    Allocated,
    /// A prepare and describe cycle completed successfully.
    Prepared,
    /// The last execute completed successfully.
    Executed,
    /// Closed explicitly, or forced closed by the bound transaction ending.
    Closed,
    /// An engine call signalled failure.
    Error,
}

/// Classification of a prepared statement, governing which operations are legal on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Not classified yet, or a kind this layer has no special handling for.
    None,
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    StoredProcedure,
    SelectForUpdate,
}

impl StatementKind {
    /// Map the type code of a statement-info response to a kind.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => StatementKind::Select,
            2 => StatementKind::Insert,
            3 => StatementKind::Update,
            4 => StatementKind::Delete,
            5 => StatementKind::Ddl,
            8 => StatementKind::StoredProcedure,
            12 => StatementKind::SelectForUpdate,
            _ => StatementKind::None,
        }
    }

    /// `true` for the kinds which produce a cursor to fetch from.
    pub fn is_cursor(self) -> bool {
        matches!(self, StatementKind::Select | StatementKind::SelectForUpdate)
    }

    /// `true` for the kinds a records-affected count is meaningful for.
    pub fn counts_records(self) -> bool {
        matches!(
            self,
            StatementKind::Insert
                | StatementKind::Update
                | StatementKind::Delete
                | StatementKind::StoredProcedure
        )
    }
}

/// Mutable core of a statement. Shared between the statement, the end-of-transaction observer
/// (which must be able to close the statement from another thread) and, weakly, the values
/// produced by it.
pub(crate) struct Core {
    handle: StmtHandle,
    state: State,
    kind: StatementKind,
    all_rows_fetched: bool,
    records_affected: i64,
    return_records_affected: bool,
    fields: Option<Descriptor>,
    parameters: Option<Descriptor>,
    /// Encoded fields block retained across fetch calls of one execution. Allocated lazily on the
    /// first fetch, released on end-of-data and on close or release.
    fetch_block: Option<Vec<u8>>,
    output_params: VecDeque<Vec<Value>>,
    transaction: Option<Arc<Transaction>>,
    subscription: Option<Subscription>,
}

impl Core {
    fn new() -> Self {
        Core {
            handle: StmtHandle::UNALLOCATED,
            state: State::Deallocated,
            kind: StatementKind::None,
            all_rows_fetched: false,
            records_affected: -1,
            return_records_affected: false,
            fields: None,
            parameters: None,
            fetch_block: None,
            output_params: VecDeque::new(),
            transaction: None,
            subscription: None,
        }
    }

    fn transaction_handle(&self, operation: &'static str) -> Result<TrHandle, Error> {
        self.transaction
            .as_ref()
            .map(|transaction| transaction.handle())
            .ok_or(Error::NoTransaction { operation })
    }

    fn clear_output_queue(&mut self) {
        self.output_params.clear();
    }

    fn clear_all(&mut self) {
        self.clear_output_queue();
        self.parameters = None;
        self.fields = None;
    }

    /// Acquire an engine-side handle. On failure the handle stays zero and the statement enters
    /// the error state.
    fn allocate(&mut self, db: &Database, channel: &mut Channel) -> Result<(), Error> {
        channel.status.clear();
        let handle = channel
            .api
            .allocate_statement(&mut channel.status, db.handle());
        if let Err(error) = db.check(&channel.status, "allocate_statement") {
            self.state = State::Error;
            return Err(error);
        }
        self.handle = handle;
        self.all_rows_fetched = false;
        self.state = State::Allocated;
        self.kind = StatementKind::None;
        Ok(())
    }

    /// Second negotiation pass for the output columns: re-describe with an exact-size descriptor
    /// built from the previously reported actual count.
    fn describe_fields(&mut self, db: &Database, channel: &mut Channel) -> Result<(), Error> {
        let actual = self
            .fields
            .as_ref()
            .map(|fields| fields.actual_count())
            .unwrap_or(0);
        let descriptor = Descriptor::new(actual);
        let mut block = sqlda::encode(&descriptor);

        channel.status.clear();
        channel
            .api
            .describe(&mut channel.status, self.handle, &mut block);
        db.check(&channel.status, "describe")?;

        // Whatever counts come back now are final. The engine is not asked a third time even if
        // they still disagree.
        self.fields = Some(sqlda::decode(&block)?);
        Ok(())
    }

    /// Two-pass negotiation for the parameter markers: probe with a single slot, re-describe once
    /// with the exact size if the engine reported more.
    fn describe_parameters(&mut self, db: &Database, channel: &mut Channel) -> Result<(), Error> {
        let probe = Descriptor::new(1);
        let mut block = sqlda::encode(&probe);

        channel.status.clear();
        channel
            .api
            .describe_bind(&mut channel.status, self.handle, &mut block);
        db.check(&channel.status, "describe_bind")?;
        let mut described = sqlda::decode(&block)?;

        if described.actual_count() != 0 && described.actual_count() != described.count() {
            let descriptor = Descriptor::new(described.actual_count());
            block = sqlda::encode(&descriptor);

            channel.status.clear();
            channel
                .api
                .describe_bind(&mut channel.status, self.handle, &mut block);
            db.check(&channel.status, "describe_bind")?;

            // Accepted as final, mismatch or not. No third attempt.
            described = sqlda::decode(&block)?;
        } else if described.actual_count() == 0 {
            // An explicit zero-slot descriptor, so callers can tell "no parameters" apart from
            // "not yet described".
            described = Descriptor::new(0);
        }

        self.parameters = Some(described);
        Ok(())
    }

    fn query_statement_kind(
        &self,
        db: &Database,
        channel: &mut Channel,
    ) -> Result<StatementKind, Error> {
        let items = info::statement_type_request();
        let mut buffer = [0; info::STATEMENT_TYPE_BUFFER_LEN];

        channel.status.clear();
        channel
            .api
            .statement_info(&mut channel.status, self.handle, &items, &mut buffer);
        db.check(&channel.status, "statement_info")?;

        Ok(StatementKind::from_code(info::parse_statement_type(
            &buffer,
        )?))
    }

    fn query_records_affected(&self, db: &Database, channel: &mut Channel) -> Result<i64, Error> {
        let items = info::records_request();
        let mut buffer = [0; info::RECORDS_BUFFER_LEN];

        channel.status.clear();
        channel
            .api
            .statement_info(&mut channel.status, self.handle, &items, &mut buffer);
        db.check(&channel.status, "statement_info")?;

        info::parse_records_affected(&buffer)
    }

    /// Records-affected policy: only computed when the caller opted in and the kind is one which
    /// counts records. `-1` in every other case, never `0`.
    fn update_records_affected(
        &mut self,
        db: &Database,
        channel: &mut Channel,
    ) -> Result<(), Error> {
        if self.return_records_affected && self.kind.counts_records() {
            self.records_affected = self.query_records_affected(db, channel)?;
        } else {
            self.records_affected = -1;
        }
        Ok(())
    }

    fn free(
        &mut self,
        db: &Database,
        channel: &mut Channel,
        option: FreeStatementOption,
    ) -> Result<(), Error> {
        // The engine has no meaningful close operation for an executed procedure. Deliberate
        // no-op, not a failure.
        if self.kind == StatementKind::StoredProcedure && option == FreeStatementOption::Close {
            return Ok(());
        }

        channel.status.clear();
        if self.handle.is_allocated() {
            self.handle = channel
                .api
                .free_statement(&mut channel.status, self.handle, option);
        }

        if option == FreeStatementOption::Drop {
            // Dropping invalidates the handle whatever the engine answered. The handle is zero
            // exactly in the deallocated state, so the state follows suit.
            self.parameters = None;
            self.fields = None;
            self.handle = StmtHandle::UNALLOCATED;
            self.state = State::Deallocated;
            self.kind = StatementKind::None;
        }
        self.clear_output_queue();
        self.all_rows_fetched = false;

        db.check(&channel.status, "free_statement")
    }
}

/// A single prepared SQL statement, bound to a [`Database`] and at most one [`Transaction`].
///
/// The statement owns an engine-side handle and sequences the allocate, prepare, describe,
/// execute, fetch and free calls on it, enforcing the legality of each operation per lifecycle
/// state. All engine calls are synchronous and hold the exclusive channel of the owning database
/// for their duration.
///
/// Dropping the statement releases the handle best-effort: engine errors during teardown are
/// logged and discarded, they never propagate out of drop.
pub struct Statement {
    db: Arc<Database>,
    core: Arc<Mutex<Core>>,
}

impl Statement {
    /// A fresh, unallocated statement on the given database. The handle is acquired lazily by the
    /// first [`Self::prepare`].
    pub fn new(db: Arc<Database>, transaction: Option<Arc<Transaction>>) -> Self {
        let mut statement = Statement {
            db,
            core: Arc::new(Mutex::new(Core::new())),
        };
        statement.set_transaction(transaction);
        statement
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn state(&self) -> State {
        self.lock_core().state
    }

    pub fn kind(&self) -> StatementKind {
        self.lock_core().kind
    }

    /// `false` exactly in the deallocated and error states.
    pub fn is_prepared(&self) -> bool {
        !matches!(self.state(), State::Deallocated | State::Error)
    }

    pub fn handle(&self) -> StmtHandle {
        self.lock_core().handle
    }

    pub fn all_rows_fetched(&self) -> bool {
        self.lock_core().all_rows_fetched
    }

    /// Records affected by the last execute, or `-1` if not requested or not applicable.
    pub fn records_affected(&self) -> i64 {
        self.lock_core().records_affected
    }

    pub fn return_records_affected(&self) -> bool {
        self.lock_core().return_records_affected
    }

    /// Opt in to the records-affected query issued after each successful execute.
    pub fn set_return_records_affected(&mut self, value: bool) {
        self.lock_core().return_records_affected = value;
    }

    /// Snapshot of the current output column descriptor, if described.
    pub fn fields(&self) -> Option<Descriptor> {
        self.lock_core().fields.clone()
    }

    /// Snapshot of the current parameter descriptor, if described.
    pub fn parameters(&self) -> Option<Descriptor> {
        self.lock_core().parameters.clone()
    }

    /// Replace the parameter descriptor, typically after filling slot values into a snapshot
    /// obtained from [`Self::parameters`]. Ignored while the statement is deallocated;
    /// descriptors only exist alongside a handle.
    pub fn set_parameters(&mut self, parameters: Option<Descriptor>) {
        let mut core = self.lock_core();
        if core.state == State::Deallocated {
            return;
        }
        core.parameters = parameters;
    }

    pub fn transaction(&self) -> Option<Arc<Transaction>> {
        self.lock_core().transaction.clone()
    }

    /// Bind the statement to a transaction, or unbind it with `None`.
    ///
    /// Rebinding revokes the subscription on the previously bound transaction and, if the new
    /// transaction is present, subscribes to its end-of-life notification. When the bound
    /// transaction ends independently of the statement the observer discards pending output rows,
    /// forces the state to [`State::Closed`] and clears the all-rows-fetched flag, without any
    /// caller involvement.
    pub fn set_transaction(&mut self, transaction: Option<Arc<Transaction>>) {
        let mut core = self.lock_core();

        let unchanged = match (&core.transaction, &transaction) {
            (Some(current), Some(new)) => Arc::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        let old_transaction = core.transaction.take();
        let old_subscription = core.subscription.take();
        if let (Some(old), Some(subscription)) = (old_transaction, old_subscription) {
            old.unsubscribe(subscription);
        }

        if let Some(new) = transaction {
            let weak: Weak<Mutex<Core>> = Arc::downgrade(&self.core);
            let subscription = new.subscribe(Box::new(move || {
                let Some(core) = weak.upgrade() else {
                    return;
                };
                // Locks the statement, not the database: this may race with a caller driven
                // close on the same statement from a different thread.
                let mut core = core.lock().unwrap_or_else(PoisonError::into_inner);
                core.transaction = None;
                core.subscription = None;
                core.clear_output_queue();
                if core.state != State::Deallocated {
                    core.state = State::Closed;
                }
                core.all_rows_fetched = false;
            }));
            core.transaction = Some(new);
            core.subscription = Some(subscription);
        }
    }

    /// Prepare `sql` for execution.
    ///
    /// Legal from any state. Clears the current parameter descriptor, the output column
    /// descriptor and any queued stored-procedure output rows. Allocates a handle first if the
    /// statement is deallocated. The output columns are probed with a minimal one-slot
    /// descriptor; if the engine reports more columns than probed, a second describe pass with
    /// the exact size is issued automatically. Afterwards the statement is classified and enters
    /// [`State::Prepared`].
    ///
    /// An engine error aborts the sequence and leaves the state as whatever partial progress
    /// implies. Check [`Self::is_prepared`] rather than assuming atomicity.
    pub fn prepare(&mut self, sql: &str) -> Result<(), Error> {
        let mut core = self.lock_core();
        let core = &mut *core;
        core.clear_all();

        let mut channel = self.db.channel();
        let channel = &mut *channel;

        if core.state == State::Deallocated {
            core.allocate(&self.db, channel)?;
        }
        let transaction = core.transaction_handle("prepare")?;

        // Probe with the minimal descriptor. The real column count arrives in the header of the
        // block the engine writes back.
        let probe = Descriptor::new(1);
        let mut block = sqlda::encode(&probe);

        channel.status.clear();
        channel.api.prepare(
            &mut channel.status,
            transaction,
            core.handle,
            self.db.dialect(),
            sql.as_bytes(),
            &mut block,
        );
        self.db.check(&channel.status, "prepare")?;
        let described = sqlda::decode(&block)?;

        if described.actual_count() > 0 && described.actual_count() != described.count() {
            core.fields = Some(described);
            core.describe_fields(&self.db, channel)?;
        } else if described.actual_count() == 0 {
            // An explicit zero-column descriptor, distinguishable from a stale probe shape.
            core.fields = Some(Descriptor::new(0));
        } else {
            core.fields = Some(described);
        }
        if let Some(fields) = core.fields.as_mut() {
            fields.reset_values();
        }

        core.kind = core.query_statement_kind(&self.db, channel)?;
        core.state = State::Prepared;
        Ok(())
    }

    /// Re-describe the output columns with an exact-size descriptor built from the last reported
    /// actual count. Invoked automatically by [`Self::prepare`] when the probe under-reported.
    pub fn describe(&mut self) -> Result<(), Error> {
        let mut core = self.lock_core();
        let core = &mut *core;
        if core.state == State::Deallocated {
            return Err(Error::InvalidState {
                operation: "describe",
                state: core.state,
            });
        }
        let mut channel = self.db.channel();
        core.describe_fields(&self.db, &mut channel)
    }

    /// Describe the parameter markers of the prepared statement, negotiating the descriptor size
    /// with the engine in up to two passes.
    pub fn describe_parameters(&mut self) -> Result<(), Error> {
        let mut core = self.lock_core();
        let core = &mut *core;
        if core.state == State::Deallocated {
            return Err(Error::InvalidState {
                operation: "describe_parameters",
                state: core.state,
            });
        }
        let mut channel = self.db.channel();
        core.describe_parameters(&self.db, &mut channel)
    }

    /// Execute the prepared statement with the current parameter descriptor.
    ///
    /// For stored procedures the single inline result row of the engine is captured into the
    /// output-parameter queue; it is retrieved through [`Self::get_output_parameters`], never
    /// through [`Self::fetch`]. On success the records-affected counter is updated per policy and
    /// the statement enters [`State::Executed`]. An engine failure puts it into [`State::Error`].
    pub fn execute(&mut self) -> Result<(), Error> {
        let mut core = self.lock_core();
        let core = &mut *core;
        if core.state == State::Deallocated {
            return Err(Error::InvalidState {
                operation: "execute",
                state: core.state,
            });
        }
        let transaction = core.transaction_handle("execute")?;

        let mut channel = self.db.channel();
        let channel = &mut *channel;

        let in_block = core.parameters.as_ref().map(sqlda::encode);
        let mut out_block = if core.kind == StatementKind::StoredProcedure {
            if let Some(fields) = core.fields.as_mut() {
                fields.reset_values();
            }
            core.fields.as_ref().map(sqlda::encode)
        } else {
            None
        };

        channel.status.clear();
        channel.api.execute2(
            &mut channel.status,
            transaction,
            core.handle,
            in_block.as_deref(),
            out_block.as_mut(),
        );
        if let Err(error) = self.db.check(&channel.status, "execute2") {
            core.state = State::Error;
            return Err(error);
        }

        if let Some(block) = out_block {
            let descriptor = sqlda::decode(&block)?;
            let owner = Arc::downgrade(&self.core);
            let row = descriptor
                .slots()
                .iter()
                .cloned()
                .map(|slot| Value::new(slot, owner.clone()))
                .collect();
            core.output_params.push_back(row);
        }

        core.update_records_affected(&self.db, channel)?;
        core.state = State::Executed;
        Ok(())
    }

    /// Advance the cursor by one row.
    ///
    /// Returns `Ok(None)` without touching the engine if the statement kind produces no cursor,
    /// or once all rows of the current execution have been fetched. Otherwise the retained fetch
    /// block is allocated from the current fields shape on first use, the engine advances the
    /// cursor into it, and the row is decoded into values. Resolved array handles are carried
    /// forward by position if the slot counts still match; they are per-column session state and
    /// cannot be derived from the raw fetch data again. The end-of-data sentinel releases the
    /// fetch block and yields `Ok(None)`.
    pub fn fetch(&mut self) -> Result<Option<Vec<Value>>, Error> {
        let mut core = self.lock_core();
        let core = &mut *core;
        if core.state == State::Deallocated {
            return Err(Error::InvalidState {
                operation: "fetch",
                state: core.state,
            });
        }
        if !core.kind.is_cursor() {
            return Ok(None);
        }
        if core.all_rows_fetched {
            return Ok(None);
        }
        let Some(fields) = core.fields.as_mut() else {
            return Ok(None);
        };

        let mut channel = self.db.channel();
        let channel = &mut *channel;

        fields.reset_values();
        if core.fetch_block.is_none() {
            core.fetch_block = Some(sqlda::encode(fields));
        }
        let Some(block) = core.fetch_block.as_mut() else {
            unreachable!("fetch block allocated above");
        };

        channel.status.clear();
        let status_code = channel.api.fetch(&mut channel.status, core.handle, block);
        self.db.check(&channel.status, "fetch")?;

        if status_code == FETCH_NO_MORE_ROWS {
            core.all_rows_fetched = true;
            core.fetch_block = None;
            return Ok(None);
        }
        if status_code != 0 {
            return Err(Error::NoStatusInfo { function: "fetch" });
        }

        let mut row_descriptor = sqlda::decode(block)?;
        if fields.count() == row_descriptor.count() {
            for (current, fresh) in fields.slots().iter().zip(row_descriptor.slots_mut()) {
                if current.is_array() && current.array_handle.is_some() {
                    fresh.array_handle = current.array_handle;
                }
            }
        }

        let owner = Arc::downgrade(&self.core);
        let take =
            (row_descriptor.actual_count().max(0) as usize).min(row_descriptor.slots().len());
        let row = row_descriptor.slots()[..take]
            .iter()
            .cloned()
            .map(|slot| Value::new(slot, owner.clone()))
            .collect();
        core.fields = Some(row_descriptor);
        Ok(Some(row))
    }

    /// Dequeue the oldest stored-procedure output row-set, or `None` if the queue is empty.
    pub fn get_output_parameters(&mut self) -> Option<Vec<Value>> {
        self.lock_core().output_params.pop_front()
    }

    /// Record a resolved array handle on an array-typed output column, so subsequent fetches
    /// carry it forward. Ignored for non-array columns and out-of-range indices.
    pub fn set_field_array_handle(&mut self, index: usize, handle: ArrayHandle) {
        let mut core = self.lock_core();
        if let Some(slot) = core
            .fields
            .as_mut()
            .and_then(|fields| fields.slots_mut().get_mut(index))
        {
            if slot.is_array() {
                slot.array_handle = Some(handle);
            }
        }
    }

    /// Free engine-side statement resources. [`FreeStatementOption::Close`] closes the open
    /// cursor and keeps the prepared form; [`FreeStatementOption::Drop`] discards both
    /// descriptors and returns the statement to [`State::Deallocated`]. Any option clears the
    /// output-parameter queue and resets the all-rows-fetched flag.
    pub fn free(&mut self, option: FreeStatementOption) -> Result<(), Error> {
        let mut core = self.lock_core();
        let core = &mut *core;
        let mut channel = self.db.channel();
        core.free(&self.db, &mut channel, option)
    }

    /// Close the cursor and release the retained fetch block. The statement stays prepared and
    /// can be executed again. A no-op while the statement is deallocated, there is nothing to
    /// close then.
    pub fn close(&mut self) -> Result<(), Error> {
        let mut core = self.lock_core();
        let core = &mut *core;
        if core.state == State::Deallocated {
            return Ok(());
        }
        core.fetch_block = None;
        {
            let mut channel = self.db.channel();
            core.free(&self.db, &mut channel, FreeStatementOption::Close)?;
        }
        core.state = State::Closed;
        Ok(())
    }

    /// Fully release the statement: drop the engine-side handle and all descriptors. The
    /// statement returns to [`State::Deallocated`] and can be prepared again from scratch.
    pub fn release(&mut self) -> Result<(), Error> {
        let mut core = self.lock_core();
        let core = &mut *core;
        core.fetch_block = None;
        let mut channel = self.db.channel();
        core.free(&self.db, &mut channel, FreeStatementOption::Drop)
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // Best-effort teardown. A failed release must neither mask another error nor keep the
        // managed side from cleaning up.
        if let Err(error) = self.release() {
            debug!("Failed to release statement during drop: {error}");
        }
        self.set_transaction(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classification_covers_the_type_code_table() {
        assert_eq!(StatementKind::from_code(1), StatementKind::Select);
        assert_eq!(StatementKind::from_code(2), StatementKind::Insert);
        assert_eq!(StatementKind::from_code(3), StatementKind::Update);
        assert_eq!(StatementKind::from_code(4), StatementKind::Delete);
        assert_eq!(StatementKind::from_code(5), StatementKind::Ddl);
        assert_eq!(StatementKind::from_code(8), StatementKind::StoredProcedure);
        assert_eq!(StatementKind::from_code(12), StatementKind::SelectForUpdate);
        assert_eq!(StatementKind::from_code(9), StatementKind::None);
        assert_eq!(StatementKind::from_code(0), StatementKind::None);
    }

    #[test]
    fn only_selects_produce_cursors() {
        assert!(StatementKind::Select.is_cursor());
        assert!(StatementKind::SelectForUpdate.is_cursor());
        assert!(!StatementKind::StoredProcedure.is_cursor());
        assert!(!StatementKind::Insert.is_cursor());
    }

    #[test]
    fn ddl_and_selects_never_count_records() {
        assert!(!StatementKind::Ddl.counts_records());
        assert!(!StatementKind::Select.counts_records());
        assert!(!StatementKind::SelectForUpdate.counts_records());
        assert!(StatementKind::Insert.counts_records());
        assert!(StatementKind::StoredProcedure.counts_records());
    }
}
