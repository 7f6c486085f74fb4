//! Named constants for the numeric replies this library reacts to.
//!
//! Commands dispatch on their textual form, so numerics are plain
//! three-digit strings rather than an enum.

/// 001, start of the logon conversation; carries the accepted nick.
pub const RPL_WELCOME: &str = "001";
/// 002.
pub const RPL_YOURHOST: &str = "002";
/// 003.
pub const RPL_CREATED: &str = "003";
/// 004, end of the logon conversation for normal clients.
pub const RPL_MYINFO: &str = "004";
/// 005 ISUPPORT.
pub const RPL_ISUPPORT: &str = "005";
/// 324, channel mode reply.
pub const RPL_CHANNELMODEIS: &str = "324";
/// 332, channel topic.
pub const RPL_TOPIC: &str = "332";
/// 333, topic setter and timestamp.
pub const RPL_TOPICWHOTIME: &str = "333";
/// 353, one NAMES line.
pub const RPL_NAMREPLY: &str = "353";
/// 366, end of NAMES.
pub const RPL_ENDOFNAMES: &str = "366";
/// 383, end of the logon conversation for services.
pub const RPL_YOURESERVICE: &str = "383";
/// 432.
pub const ERR_ERRONEUSNICKNAME: &str = "432";
/// 433.
pub const ERR_NICKNAMEINUSE: &str = "433";
/// 436.
pub const ERR_NICKCOLLISION: &str = "436";
/// 437.
pub const ERR_UNAVAILRESOURCE: &str = "437";
/// 464, bad server password.
pub const ERR_PASSWDMISMATCH: &str = "464";
/// 465, banned from this server.
pub const ERR_YOUREBANNEDCREEP: &str = "465";
/// 466.
pub const ERR_YOUWILLBEBANNED: &str = "466";
/// 484, connection restricted.
pub const ERR_RESTRICTED: &str = "484";
/// 670, STARTTLS go-ahead.
pub const RPL_STARTTLS: &str = "670";
/// 691, STARTTLS failure.
pub const ERR_STARTTLS: &str = "691";
/// 902, nick locked during SASL.
pub const ERR_NICKLOCKED: &str = "902";
/// 903, SASL success.
pub const RPL_SASLSUCCESS: &str = "903";
/// 904, SASL authentication failed.
pub const ERR_SASLFAIL: &str = "904";
/// 905, SASL message too long.
pub const ERR_SASLTOOLONG: &str = "905";
/// 908, unsupported SASL mechanism.
pub const RPL_SASLMECHS: &str = "908";
