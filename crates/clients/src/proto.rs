//! Wire messages of the upstream services.
//!
//! Declared by hand to match the upstream `.proto` files, so the build does
//! not need `protoc`.

/// Wire-compatible with `google.protobuf.Timestamp`.
#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

pub mod limits {
    use super::Timestamp;

    pub const GET: &str = "/awakari.limits.Service/Get";
    pub const SET: &str = "/awakari.limits.Service/Set";

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Subject {
        Undefined = 0,
        Interests = 1,
        PublishHourly = 2,
        PublishDaily = 3,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetRequest {
        #[prost(enumeration = "Subject", tag = "1")]
        pub subj: i32,
        #[prost(bool, tag = "2")]
        pub raw: bool,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetResponse {
        #[prost(int64, tag = "1")]
        pub count: i64,
        #[prost(string, tag = "2")]
        pub user_id: String,
        #[prost(message, optional, tag = "3")]
        pub expires: Option<Timestamp>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SetRequest {
        #[prost(string, tag = "1")]
        pub group_id: String,
        #[prost(string, tag = "2")]
        pub user_id: String,
        #[prost(enumeration = "Subject", tag = "3")]
        pub subj: i32,
        #[prost(int64, tag = "4")]
        pub count: i64,
        #[prost(message, optional, tag = "5")]
        pub expires: Option<Timestamp>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SetResponse {}
}

pub mod feeds {
    pub const READ: &str = "/awakari.source.feeds.Service/Read";

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadRequest {
        #[prost(string, tag = "1")]
        pub url: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadResponse {
        #[prost(message, optional, tag = "1")]
        pub feed: Option<Feed>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Feed {
        #[prost(string, tag = "1")]
        pub url: String,
        #[prost(string, tag = "2")]
        pub group_id: String,
        #[prost(string, tag = "3")]
        pub user_id: String,
    }
}

pub mod sites {
    pub const READ: &str = "/awakari.source.sites.Service/Read";

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadRequest {
        #[prost(string, tag = "1")]
        pub addr: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadResponse {
        #[prost(message, optional, tag = "1")]
        pub site: Option<Site>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Site {
        #[prost(string, tag = "1")]
        pub addr: String,
        #[prost(string, tag = "2")]
        pub group_id: String,
        #[prost(string, tag = "3")]
        pub user_id: String,
    }
}

pub mod telegram {
    pub const READ: &str = "/awakari.source.telegram.Service/Read";

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadRequest {
        #[prost(string, tag = "1")]
        pub link: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadResponse {
        #[prost(message, optional, tag = "1")]
        pub channel: Option<Channel>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Channel {
        #[prost(string, tag = "1")]
        pub link: String,
        #[prost(string, tag = "2")]
        pub group_id: String,
        #[prost(string, tag = "3")]
        pub user_id: String,
    }
}

pub mod activitypub {
    pub const CREATE: &str = "/awakari.int.activitypub.Service/Create";
    pub const READ: &str = "/awakari.int.activitypub.Service/Read";

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreateRequest {
        #[prost(string, tag = "1")]
        pub addr: String,
        #[prost(string, tag = "2")]
        pub group_id: String,
        #[prost(string, tag = "3")]
        pub user_id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreateResponse {
        #[prost(string, tag = "1")]
        pub url: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadRequest {
        #[prost(string, tag = "1")]
        pub url: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadResponse {
        #[prost(message, optional, tag = "1")]
        pub src: Option<Source>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Source {
        #[prost(string, tag = "1")]
        pub actor_id: String,
        #[prost(string, tag = "2")]
        pub group_id: String,
        #[prost(string, tag = "3")]
        pub user_id: String,
        #[prost(string, tag = "4")]
        pub name: String,
    }
}

pub mod interests {
    pub const SEARCH: &str = "/awakari.interests.api.Service/Search";
    pub const READ: &str = "/awakari.interests.api.Service/Read";

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Order {
        Asc = 0,
        Desc = 1,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Sort {
        Id = 0,
        Followers = 1,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Cursor {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(int64, tag = "2")]
        pub followers: i64,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SearchRequest {
        #[prost(message, optional, tag = "1")]
        pub cursor: Option<Cursor>,
        #[prost(uint32, tag = "2")]
        pub limit: u32,
        #[prost(enumeration = "Order", tag = "3")]
        pub order: i32,
        #[prost(enumeration = "Sort", tag = "4")]
        pub sort: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SearchResponse {
        #[prost(string, repeated, tag = "1")]
        pub ids: Vec<String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadRequest {
        #[prost(string, tag = "1")]
        pub id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReadResponse {
        #[prost(string, tag = "1")]
        pub description: String,
        #[prost(bool, tag = "2")]
        pub public: bool,
        #[prost(int64, tag = "3")]
        pub followers: i64,
    }
}
