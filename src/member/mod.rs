pub mod args;
pub mod repository;

pub use args::{FilterMemberArgs, GetMemberArgs, GetMembersArgs, IdType, NicknameArgs, RangeFilter, SetFilter};
pub use repository::MemberRepository;
