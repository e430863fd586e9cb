pub mod domain;
pub mod memory;
pub mod ports;
pub mod query;
pub mod services;
pub mod values;

pub use domain::{Book, ReadingStatus, Recording, UserBook};
pub use memory::MemoryStore;
pub use ports::{
    BookRepository, PortError, PortResult, RecordingRepository, UserBookRepository,
};
pub use query::{Connective, Filter, FilterOperator, Query, QueryError, QueryPlan, SortOrder};
pub use services::{ReadingService, ReadingSession, RecordOutcome};
pub use values::{
    BookId, MinuteCount, Notes, PageCount, ReadingDate, RecordingId, UserBookId, UserId,
    ValueError,
};
