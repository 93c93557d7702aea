/// 实时推送协议模块
/// 
/// 服务端按商品推送的文本帧定义，以及帧的解码与分类

pub mod codec;
pub mod message;

pub use codec::{decode, Frame};
pub use message::{
    classify, EntityUpdateMessage, InboundMessage, InitialStockMessage, MessageKind,
    StockUpdateMessage,
};
