//! Response constants module.
//!
//! All NNTP status lines the server sends, in one place.

pub const RESP_CRLF: &str = "\r\n";
pub const RESP_DOT_CRLF: &str = ".\r\n";

// Connection and status responses
pub const RESP_200_GREETING: &str = concat!("200 lord/", env!("CARGO_PKG_VERSION"), "\r\n");
pub const RESP_200_POSTING_ALLOWED: &str = "200 Posting allowed\r\n";
pub const RESP_205_CLOSING: &str = "205 Closing connection\r\n";

// Multi-line openers
pub const RESP_100_HELP_FOLLOWS: &str = "100 Help text follows\r\n";
pub const RESP_101_CAPABILITIES: &str = "101 Capability list follows\r\n";
pub const RESP_215_LIST_FOLLOWS: &str = "215 Newsgroups follow\r\n";
pub const RESP_215_DESCRIPTIONS: &str = "215 Descriptions follow\r\n";
pub const RESP_215_OVERVIEW_FMT: &str = "215 Order of fields in overview database\r\n";
pub const RESP_224_OVERVIEW: &str = "224 Overview information follows\r\n";
pub const RESP_230_NEWNEWS: &str = "230 List of new articles follows\r\n";
pub const RESP_231_NEWGROUPS: &str = "231 List of new newsgroups follows\r\n";

// Posting
pub const RESP_340_SEND_ARTICLE: &str = "340 Send article; end with <CR-LF>.<CR-LF>\r\n";
pub const RESP_240_POSTED: &str = "240 Article posted at LOR\r\n";
pub const RESP_441_FALLBACK: &str = "Something failed";

// 4xx responses
pub const RESP_411_NO_SUCH_GROUP: &str = "411 No such newsgroup\r\n";
pub const RESP_412_NO_GROUP: &str = "412 No newsgroup selected\r\n";
pub const RESP_420_NO_CURRENT: &str = "420 No current article selected\r\n";
pub const RESP_421_NO_NEXT: &str = "421 No next article\r\n";
pub const RESP_422_NO_PREV: &str = "422 No previous article\r\n";
pub const RESP_423_NO_ARTICLE_NUM: &str = "423 No such article number in this group\r\n";
pub const RESP_430_NO_ARTICLE: &str = "430 No article with that message-id\r\n";

// 5xx responses
pub const RESP_500_UNKNOWN_CMD: &str = "500 Unknown command\r\n";
pub const RESP_501_SYNTAX: &str = "501 Bad syntax\r\n";
pub const RESP_503_NO_OVER_BY_ID: &str = "503 Overview by message-id unsupported\r\n";

// Capability list items
pub const RESP_CAP_VERSION: &str = "VERSION 2\r\n";
pub const RESP_CAP_IMPLEMENTATION: &str =
    concat!("IMPLEMENTATION lord/", env!("CARGO_PKG_VERSION"), "\r\n");
pub const RESP_CAP_READER: &str = "READER\r\n";
pub const RESP_CAP_NEWNEWS: &str = "NEWNEWS\r\n";
pub const RESP_CAP_LIST: &str = "LIST ACTIVE NEWSGROUPS OVERVIEW.FMT\r\n";
pub const RESP_CAP_OVER: &str = "OVER\r\n";
pub const RESP_CAP_POST: &str = "POST\r\n";

// Help text
pub const RESP_HELP_TEXT: &str = concat!(
    "CAPABILITIES\r\n",
    "MODE READER\r\n",
    "GROUP\r\n",
    "LISTGROUP\r\n",
    "LIST\r\n",
    "ARTICLE\r\n",
    "HEAD\r\n",
    "BODY\r\n",
    "STAT\r\n",
    "OVER\r\n",
    "XOVER\r\n",
    "NEXT\r\n",
    "LAST\r\n",
    "NEWGROUPS\r\n",
    "NEWNEWS\r\n",
    "POST\r\n",
    "DATE\r\n",
    "HELP\r\n",
    "QUIT\r\n"
);
