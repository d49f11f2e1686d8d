use super::status::StatusVector;

/// Version tag carried in the header of every encoded descriptor block.
pub const SQLDA_VERSION1: u16 = 1;

/// Return value of [`EngineApi::fetch`] signalling that no further rows exist for the current
/// execution.
pub const FETCH_NO_MORE_ROWS: i32 = 100;

/// Handle of an attached database as issued by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DbHandle(pub u32);

/// Handle of an active transaction as issued by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TrHandle(pub u32);

/// Handle of an allocated statement. `0` means unallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StmtHandle(pub u32);

impl StmtHandle {
    /// The statement has no engine-side counterpart yet.
    pub const UNALLOCATED: StmtHandle = StmtHandle(0);

    pub fn is_allocated(self) -> bool {
        self.0 != 0
    }
}

/// Option argument of [`EngineApi::free_statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeStatementOption {
    /// Close the open cursor, keep the prepared form.
    Close,
    /// Drop the statement entirely, invalidating the handle.
    Drop,
}

impl FreeStatementOption {
    /// Numeric option code as it goes over the wire.
    pub fn as_code(self) -> u16 {
        match self {
            FreeStatementOption::Close => 1,
            FreeStatementOption::Drop => 2,
        }
    }
}

/// Call boundary to the database engine.
///
/// Every method blocks the calling thread until the engine replies and reports errors or warnings
/// exclusively through the status vector passed as first argument. The vector is cleared by the
/// caller before the call; after the call a non-empty vector must be handed to
/// [`crate::Database::check`] before any output of the call is used.
///
/// Descriptor buffers use the encoding implemented in [`crate::handles::sqlda`]. The engine reads
/// the requested slot count from the header and writes back slot metadata, values and the actual
/// slot count.
///
/// This trait is the seam towards the physical transport, which is out of scope for this crate.
/// Implementations wrap whatever carries the calls to the server process. Tests script it with an
/// in-process fake.
pub trait EngineApi: Send + Sync {
    /// Allocate a statement handle on the given database attachment.
    ///
    /// Returns [`StmtHandle::UNALLOCATED`] and fills the status vector on failure.
    fn allocate_statement(&self, status: &mut StatusVector, db: DbHandle) -> StmtHandle;

    /// Compile the SQL text into the prepared form of the statement. `fields` carries the encoded
    /// probe descriptor in and the described output columns out.
    fn prepare(
        &self,
        status: &mut StatusVector,
        transaction: TrHandle,
        statement: StmtHandle,
        dialect: u16,
        sql: &[u8],
        fields: &mut Vec<u8>,
    );

    /// Describe the output columns of a prepared statement into `fields`.
    fn describe(&self, status: &mut StatusVector, statement: StmtHandle, fields: &mut Vec<u8>);

    /// Describe the parameter markers of a prepared statement into `parameters`.
    fn describe_bind(
        &self,
        status: &mut StatusVector,
        statement: StmtHandle,
        parameters: &mut Vec<u8>,
    );

    /// Execute a prepared statement. `parameters` carries the encoded input descriptor, if any.
    /// `fields`, if present, is filled with the single inline result row of a stored procedure.
    fn execute2(
        &self,
        status: &mut StatusVector,
        transaction: TrHandle,
        statement: StmtHandle,
        parameters: Option<&[u8]>,
        fields: Option<&mut Vec<u8>>,
    );

    /// Advance the open cursor by one row, writing the row into `fields`. Returns `0` on success
    /// and [`FETCH_NO_MORE_ROWS`] once the result set is exhausted.
    fn fetch(&self, status: &mut StatusVector, statement: StmtHandle, fields: &mut Vec<u8>) -> i32;

    /// Close the cursor of, or entirely drop, a statement. Returns the handle value after the
    /// operation; dropping invalidates the handle.
    fn free_statement(
        &self,
        status: &mut StatusVector,
        statement: StmtHandle,
        option: FreeStatementOption,
    ) -> StmtHandle;

    /// Query statement information. `items` lists the requested info item codes, the tagged
    /// response is written into `buffer`.
    fn statement_info(
        &self,
        status: &mut StatusVector,
        statement: StmtHandle,
        items: &[u8],
        buffer: &mut [u8],
    );
}
