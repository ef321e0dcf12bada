use std::fmt::{self, Display};
use std::str::FromStr;

use crate::Error;

/// The request methods the client can put on the wire.
///
/// A request is [`Post`](Method::Post) exactly when it carries a non-empty
/// form body; everything else is a [`Get`](Method::Get).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Method {
    /// The GET method requests transfer of a current selected
    /// representation for the target resource.
    Get,

    /// The POST method requests that the target resource process the
    /// representation enclosed in the request.
    Post,
}

impl Method {
    /// The uppercase wire name of this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("get") {
            Ok(Self::Get)
        } else if s.eq_ignore_ascii_case("post") {
            Ok(Self::Post)
        } else {
            Err(Error::UnrecognizedMethod(s.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Method;

    #[test]
    fn display_and_parse() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Post.to_string(), "POST");
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert!("PUT".parse::<Method>().is_err());
    }
}
